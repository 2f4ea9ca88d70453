use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::booking::BookingError;

/// Milliseconds of naive local time.
pub type Ms = i64;

/// Half-open interval `[start, end)`. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Result<Self, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Saturates at `Ms::MAX` for spans wider than `i64` can express.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// True iff `window` overlaps none of `spans`.
///
/// Availability is always decided this way: a single conflicting span is enough to
/// make the window unavailable, however many other spans miss it.
pub fn none_overlap<'a, I>(window: &Span, spans: I) -> bool
where
    I: IntoIterator<Item = &'a Span>,
{
    spans.into_iter().all(|s| !window.overlaps(s))
}

/// Whether two occupations of the same venue compete for space, given their zone
/// sets. An empty set is the whole venue and competes with everything.
pub fn footprints_collide(a: &BTreeSet<Ulid>, b: &BTreeSet<Ulid>) -> bool {
    a.is_empty() || b.is_empty() || !a.is_disjoint(b)
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueInfo {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub name: String,
}

/// What kind of program an event belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Entertainment,
    Enlightenment,
    Education,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Entertainment => "entertainment",
            Scope::Enlightenment => "enlightenment",
            Scope::Education => "education",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entertainment" => Ok(Scope::Entertainment),
            "enlightenment" => Ok(Scope::Enlightenment),
            "education" => Ok(Scope::Education),
            other => Err(format!("unknown event scope {other:?}")),
        }
    }
}

/// The reason a space gets booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: Ulid,
    pub title: String,
    pub start_at: Ms,
    pub description: Option<String>,
    pub scope: Scope,
}

impl EventInfo {
    pub fn new(id: Ulid, title: impl Into<String>, start_at: Ms) -> Self {
        Self {
            id,
            title: title.into(),
            start_at,
            description: None,
            scope: Scope::default(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        let description = description.trim();
        self.description = (!description.is_empty()).then(|| description.to_string());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// A time-bounded occupation of a whole venue (empty `zone_ids`) or of a subset of
/// its zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub event_id: Ulid,
    pub venue_id: Ulid,
    pub zone_ids: BTreeSet<Ulid>,
    pub span: Span,
    pub comment: Option<String>,
}

impl Reservation {
    pub fn is_whole_venue(&self) -> bool {
        self.zone_ids.is_empty()
    }
}

// ── Occupancy ────────────────────────────────────────────────────

/// One reservation's footprint on a venue or zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Booked {
    pub reservation_id: Ulid,
    pub span: Span,
}

/// Reservation spans attached to one venue or zone, sorted by `span.start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupancy {
    entries: Vec<Booked>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, booked: Booked) {
        let pos = self
            .entries
            .binary_search_by_key(&booked.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, booked);
    }

    pub fn remove(&mut self, reservation_id: Ulid) -> Option<Booked> {
        let pos = self
            .entries
            .iter()
            .position(|b| b.reservation_id == reservation_id)?;
        Some(self.entries.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Booked> {
        self.entries.iter()
    }

    /// Entries whose span overlaps `window`.
    /// Binary search skips everything starting at or after `window.end`.
    pub fn overlapping(&self, window: &Span) -> impl Iterator<Item = &Booked> {
        let right_bound = self
            .entries
            .partition_point(|b| b.span.start < window.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |b| b.span.end > window.start)
    }

    /// True iff nothing here overlaps `window`.
    pub fn is_free(&self, window: &Span) -> bool {
        none_overlap(window, self.entries.iter().map(|b| &b.span))
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// Store mutations, one per WAL record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    VenueCreated {
        id: Ulid,
        name: String,
    },
    VenueDeleted {
        id: Ulid,
    },
    ZoneCreated {
        id: Ulid,
        venue_id: Ulid,
        name: String,
    },
    ZoneDeleted {
        id: Ulid,
    },
    EventCreated {
        id: Ulid,
        title: String,
        start_at: Ms,
        description: Option<String>,
        scope: Scope,
    },
    EventDeleted {
        id: Ulid,
    },
    ReservationConfirmed {
        id: Ulid,
        event_id: Ulid,
        venue_id: Ulid,
        zone_ids: Vec<Ulid>,
        span: Span,
        comment: Option<String>,
    },
    ReservationRescheduled {
        id: Ulid,
        span: Span,
    },
    ReservationCancelled {
        id: Ulid,
    },
}

impl Change {
    pub fn event_created(event: &EventInfo) -> Self {
        Change::EventCreated {
            id: event.id,
            title: event.title.clone(),
            start_at: event.start_at,
            description: event.description.clone(),
            scope: event.scope,
        }
    }

    pub fn confirmed(reservation: &Reservation) -> Self {
        Change::ReservationConfirmed {
            id: reservation.id,
            event_id: reservation.event_id,
            venue_id: reservation.venue_id,
            zone_ids: reservation.zone_ids.iter().copied().collect(),
            span: reservation.span,
            comment: reservation.comment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: Ms, end: Ms) -> Span {
        Span::new(start, end).unwrap()
    }

    fn booked(start: Ms, end: Ms) -> Booked {
        Booked {
            reservation_id: Ulid::new(),
            span: span(start, end),
        }
    }

    #[test]
    fn span_basics() {
        let s = span(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("Education".parse::<Scope>(), Ok(Scope::Education));
        assert_eq!(" enlightenment ".parse::<Scope>(), Ok(Scope::Enlightenment));
        assert!("sports".parse::<Scope>().is_err());
        assert_eq!(Scope::Entertainment.as_str(), "entertainment");
    }

    #[test]
    fn event_description_is_trimmed() {
        let e = EventInfo::new(Ulid::new(), "Gala", 0).with_description("  black tie ");
        assert_eq!(e.description.as_deref(), Some("black tie"));
        assert_eq!(EventInfo::new(Ulid::new(), "Gala", 0).with_description("   ").description, None);
    }

    #[test]
    fn duration_saturates_on_extreme_spans() {
        let s = span(Ms::MIN, Ms::MAX);
        assert_eq!(s.duration_ms(), Ms::MAX);
    }

    #[test]
    fn span_rejects_empty_and_inverted() {
        assert!(matches!(
            Span::new(100, 100),
            Err(BookingError::InvalidInterval { start: 100, end: 100 })
        ));
        assert!(matches!(
            Span::new(200, 100),
            Err(BookingError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn span_overlap() {
        let a = span(100, 200);
        let b = span(150, 250);
        let c = span(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn overlap_is_symmetric() {
        let spans = [
            span(0, 10),
            span(5, 15),
            span(10, 20),
            span(0, 30),
            span(12, 13),
            span(-5, 1),
        ];
        for a in &spans {
            for b in &spans {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn span_overlaps_itself() {
        for s in [span(0, 1), span(100, 200), span(-50, 50)] {
            assert!(s.overlaps(&s));
        }
    }

    #[test]
    fn none_overlap_requires_every_span_to_miss() {
        let window = span(100, 200);
        // One span misses, another hits: the window is NOT free.
        let spans = [span(0, 50), span(150, 250)];
        assert!(!none_overlap(&window, &spans));

        let spans = [span(0, 100), span(200, 300)];
        assert!(none_overlap(&window, &spans));

        assert!(none_overlap(&window, &[] as &[Span]));
    }

    #[test]
    fn footprints() {
        let (z1, z2, z3) = (Ulid::new(), Ulid::new(), Ulid::new());
        let whole = BTreeSet::new();
        let a: BTreeSet<Ulid> = [z1, z2].into();
        let b: BTreeSet<Ulid> = [z2, z3].into();
        let c: BTreeSet<Ulid> = [z3].into();
        assert!(footprints_collide(&whole, &whole));
        assert!(footprints_collide(&whole, &a));
        assert!(footprints_collide(&c, &whole));
        assert!(footprints_collide(&a, &b));
        assert!(!footprints_collide(&a, &c));
    }

    #[test]
    fn occupancy_ordering() {
        let mut occ = Occupancy::new();
        occ.insert(booked(300, 400));
        occ.insert(booked(100, 200));
        occ.insert(booked(200, 300));
        let starts: Vec<Ms> = occ.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn occupancy_remove() {
        let mut occ = Occupancy::new();
        let b = booked(100, 200);
        occ.insert(b);
        occ.insert(booked(300, 400));
        assert_eq!(occ.remove(b.reservation_id), Some(b));
        assert_eq!(occ.len(), 1);
        assert!(occ.remove(Ulid::new()).is_none());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut occ = Occupancy::new();
        occ.insert(booked(100, 200));
        occ.insert(booked(450, 600));
        occ.insert(booked(1000, 1100));

        let hits: Vec<_> = occ.overlapping(&span(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, span(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut occ = Occupancy::new();
        occ.insert(booked(100, 200));
        assert_eq!(occ.overlapping(&span(200, 300)).count(), 0);
        assert!(occ.is_free(&span(200, 300)));
        assert!(occ.is_free(&span(0, 100)));
    }

    #[test]
    fn overlapping_large_entry_spanning_window() {
        let mut occ = Occupancy::new();
        occ.insert(booked(0, 10_000));
        assert_eq!(occ.overlapping(&span(500, 600)).count(), 1);
        assert!(!occ.is_free(&span(500, 600)));
    }

    #[test]
    fn change_serialization_roundtrip() {
        let change = Change::ReservationConfirmed {
            id: Ulid::new(),
            event_id: Ulid::new(),
            venue_id: Ulid::new(),
            zone_ids: vec![Ulid::new(), Ulid::new()],
            span: span(1000, 2000),
            comment: Some("rehearsal".into()),
        };
        let bytes = bincode::serialize(&change).unwrap();
        let decoded: Change = bincode::deserialize(&bytes).unwrap();
        assert_eq!(change, decoded);
    }
}
