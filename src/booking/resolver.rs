use ulid::Ulid;

use crate::model::*;

use super::snapshot::{ResourceModel, VenueEntry};
use super::BookingError;

// ── Availability Algorithm ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityMode {
    /// The venue has no zones and can be booked as one unit.
    WholeVenue,
    /// No whole-venue reservation blocks the venue; these zones are individually free.
    PartialZones(Vec<ZoneInfo>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub venue: VenueInfo,
    pub mode: AvailabilityMode,
}

/// One row of the zone picker: every zone of a venue, with busy ones flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneState {
    pub zone: ZoneInfo,
    pub free: bool,
}

/// Venues that can host a booking during `window`, in input order.
///
/// Each venue is judged on its own:
/// 1. A whole-venue reservation overlapping the window rules the venue out.
/// 2. A venue without zones is then bookable whole.
/// 3. Otherwise the venue qualifies only if at least one zone is free.
pub fn find_available(window: &Span, model: &ResourceModel) -> Vec<AvailabilityResult> {
    model
        .venues()
        .filter_map(|venue| resolve_venue(window, model, venue))
        .collect()
}

fn resolve_venue(window: &Span, model: &ResourceModel, venue: &VenueEntry) -> Option<AvailabilityResult> {
    if !venue.occupancy.is_free(window) {
        return None;
    }
    if !venue.has_zones() {
        return Some(AvailabilityResult {
            venue: venue.info.clone(),
            mode: AvailabilityMode::WholeVenue,
        });
    }

    let usable: Vec<ZoneInfo> = model
        .zones_of(venue)
        .filter(|z| z.occupancy.is_free(window))
        .map(|z| z.info.clone())
        .collect();
    if usable.is_empty() {
        return None;
    }
    Some(AvailabilityResult {
        venue: venue.info.clone(),
        mode: AvailabilityMode::PartialZones(usable),
    })
}

/// Every zone of `venue_id` with its free/busy state for `window`.
/// A whole-venue reservation makes every zone busy.
pub fn zone_states(window: &Span, model: &ResourceModel, venue_id: Ulid) -> Result<Vec<ZoneState>, BookingError> {
    let venue = model
        .venue(&venue_id)
        .ok_or(BookingError::UnknownVenue(venue_id))?;
    let venue_free = venue.occupancy.is_free(window);
    Ok(model
        .zones_of(venue)
        .map(|z| ZoneState {
            zone: z.info.clone(),
            free: venue_free && z.occupancy.is_free(window),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const H: Ms = 3_600_000;

    fn span(start: Ms, end: Ms) -> Span {
        Span::new(start, end).unwrap()
    }

    struct Fixture {
        venues: Vec<VenueInfo>,
        zones: Vec<ZoneInfo>,
        reservations: Vec<Reservation>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                venues: Vec::new(),
                zones: Vec::new(),
                reservations: Vec::new(),
            }
        }

        fn venue(&mut self, name: &str) -> VenueInfo {
            let v = VenueInfo {
                id: Ulid::new(),
                name: name.into(),
            };
            self.venues.push(v.clone());
            v
        }

        fn zone(&mut self, venue: &VenueInfo, name: &str) -> ZoneInfo {
            let z = ZoneInfo {
                id: Ulid::new(),
                venue_id: venue.id,
                name: name.into(),
            };
            self.zones.push(z.clone());
            z
        }

        fn book(&mut self, venue: &VenueInfo, zones: &[&ZoneInfo], start: Ms, end: Ms) -> Ulid {
            let id = Ulid::new();
            self.reservations.push(Reservation {
                id,
                event_id: Ulid::new(),
                venue_id: venue.id,
                zone_ids: zones.iter().map(|z| z.id).collect::<BTreeSet<_>>(),
                span: span(start, end),
                comment: None,
            });
            id
        }

        fn model(&self) -> ResourceModel {
            ResourceModel::from_parts(self.venues.clone(), self.zones.clone(), &self.reservations).unwrap()
        }
    }

    #[test]
    fn empty_venue_is_whole_venue_available() {
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        let result = find_available(&span(10 * H, 11 * H), &fx.model());
        assert_eq!(
            result,
            vec![AvailabilityResult {
                venue: hall,
                mode: AvailabilityMode::WholeVenue
            }]
        );
    }

    #[test]
    fn boundary_touch_is_available() {
        // Venue without zones, booked [10:00, 11:00); query [11:00, 12:00).
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        fx.book(&hall, &[], 10 * H, 11 * H);
        let result = find_available(&span(11 * H, 12 * H), &fx.model());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].venue, hall);
        assert_eq!(result[0].mode, AvailabilityMode::WholeVenue);
    }

    #[test]
    fn overlapping_whole_venue_booking_excludes_venue() {
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        fx.book(&hall, &[], 10 * H, 11 * H);
        assert!(find_available(&span(10 * H + 30 * 60_000, 12 * H), &fx.model()).is_empty());
    }

    #[test]
    fn partially_booked_zones() {
        // Zones {Z1, Z2}; Z1 booked [09:00, 10:00); query [09:30, 10:30).
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        let z1 = fx.zone(&hall, "Z1");
        let z2 = fx.zone(&hall, "Z2");
        fx.book(&hall, &[&z1], 9 * H, 10 * H);

        let result = find_available(&span(9 * H + 30 * 60_000, 10 * H + 30 * 60_000), &fx.model());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].mode, AvailabilityMode::PartialZones(vec![z2]));
    }

    #[test]
    fn whole_venue_booking_blocks_free_zones() {
        // Whole-venue booking [09:00, 17:00); zones individually free; query [10:00, 11:00).
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        fx.zone(&hall, "Z1");
        fx.zone(&hall, "Z2");
        fx.book(&hall, &[], 9 * H, 17 * H);
        assert!(find_available(&span(10 * H, 11 * H), &fx.model()).is_empty());
    }

    #[test]
    fn all_zones_booked_excludes_venue() {
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        let z1 = fx.zone(&hall, "Z1");
        let z2 = fx.zone(&hall, "Z2");
        fx.book(&hall, &[&z1], 9 * H, 12 * H);
        fx.book(&hall, &[&z2], 10 * H, 11 * H);
        assert!(find_available(&span(10 * H, 11 * H), &fx.model()).is_empty());
    }

    #[test]
    fn multi_zone_booking_occupies_every_zone() {
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        let z1 = fx.zone(&hall, "Z1");
        let z2 = fx.zone(&hall, "Z2");
        let z3 = fx.zone(&hall, "Z3");
        fx.book(&hall, &[&z1, &z2], 9 * H, 12 * H);
        let result = find_available(&span(10 * H, 11 * H), &fx.model());
        assert_eq!(result[0].mode, AvailabilityMode::PartialZones(vec![z3]));
    }

    #[test]
    fn one_miss_does_not_hide_a_hit() {
        // Two reservations on the same zone: one misses the window, one hits it.
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        let z1 = fx.zone(&hall, "Z1");
        fx.book(&hall, &[&z1], H, 2 * H);
        fx.book(&hall, &[&z1], 10 * H, 11 * H);
        assert!(find_available(&span(10 * H, 12 * H), &fx.model()).is_empty());

        let mut fx = Fixture::new();
        let gym = fx.venue("Gym");
        fx.book(&gym, &[], H, 2 * H);
        fx.book(&gym, &[], 10 * H, 11 * H);
        assert!(find_available(&span(10 * H, 12 * H), &fx.model()).is_empty());
    }

    #[test]
    fn venues_are_independent_and_ordered() {
        let mut fx = Fixture::new();
        let a = fx.venue("A");
        let b = fx.venue("B");
        let c = fx.venue("C");
        fx.book(&b, &[], 0, 24 * H);
        let result = find_available(&span(10 * H, 11 * H), &fx.model());
        let ids: Vec<Ulid> = result.iter().map(|r| r.venue.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn deterministic() {
        let mut fx = Fixture::new();
        for i in 0..5 {
            let v = fx.venue(&format!("V{i}"));
            let z = fx.zone(&v, "Z");
            fx.zone(&v, "Y");
            if i % 2 == 0 {
                fx.book(&v, &[&z], 10 * H, 11 * H);
            }
        }
        let model = fx.model();
        let window = span(10 * H, 12 * H);
        let first = find_available(&window, &model);
        for _ in 0..10 {
            assert_eq!(find_available(&window, &model), first);
        }
        let rebuilt = find_available(&window, &fx.model());
        assert_eq!(rebuilt, first);
    }

    #[test]
    fn zone_states_flags_busy_zones() {
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        let z1 = fx.zone(&hall, "Z1");
        let z2 = fx.zone(&hall, "Z2");
        fx.book(&hall, &[&z1], 9 * H, 10 * H);

        let states = zone_states(&span(9 * H, 11 * H), &fx.model(), hall.id).unwrap();
        assert_eq!(
            states,
            vec![
                ZoneState { zone: z1, free: false },
                ZoneState { zone: z2, free: true },
            ]
        );
    }

    #[test]
    fn zone_states_all_busy_under_whole_venue_booking() {
        let mut fx = Fixture::new();
        let hall = fx.venue("Hall");
        fx.zone(&hall, "Z1");
        fx.book(&hall, &[], 9 * H, 10 * H);
        let states = zone_states(&span(9 * H, 11 * H), &fx.model(), hall.id).unwrap();
        assert!(states.iter().all(|s| !s.free));
    }

    #[test]
    fn zone_states_unknown_venue() {
        let fx = Fixture::new();
        let id = Ulid::new();
        assert_eq!(
            zone_states(&span(0, H), &fx.model(), id),
            Err(BookingError::UnknownVenue(id))
        );
    }
}
