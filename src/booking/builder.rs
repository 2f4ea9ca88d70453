use std::collections::BTreeSet;

use ulid::Ulid;

use crate::limits::MAX_COMMENT_LEN;
use crate::model::*;

use super::snapshot::{ResourceModel, VenueEntry};
use super::BookingError;

/// A confirmed selection, ready to be turned into a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub span: Span,
    /// Empty means the whole venue.
    pub zone_ids: BTreeSet<Ulid>,
    pub event_id: Ulid,
    pub comment: Option<String>,
}

impl BookingRequest {
    pub fn new(
        venue_id: Ulid,
        span: Span,
        zone_ids: impl IntoIterator<Item = Ulid>,
        event_id: Ulid,
        comment: &str,
    ) -> Self {
        let comment = comment.trim();
        Self {
            id: Ulid::new(),
            venue_id,
            span,
            zone_ids: zone_ids.into_iter().collect(),
            event_id,
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        }
    }

    pub fn with_id(mut self, id: Ulid) -> Self {
        self.id = id;
        self
    }
}

/// Materialize a reservation for `request`, re-validated against `model`.
///
/// `model` must be a snapshot taken after the user confirmed the selection: the
/// availability check is repeated here for exactly the requested combination, and any
/// reservation that appeared since resolution turns into `Obsolete`. Nothing is
/// persisted; the caller writes the reservation and its zone links in one go.
pub fn build(model: &ResourceModel, request: &BookingRequest) -> Result<Reservation, BookingError> {
    if request.span.start >= request.span.end {
        return Err(BookingError::InvalidInterval {
            start: request.span.start,
            end: request.span.end,
        });
    }
    let venue = model
        .venue(&request.venue_id)
        .ok_or(BookingError::UnknownVenue(request.venue_id))?;
    check_zones_belong(model, venue, &request.zone_ids)?;
    if let Some(c) = &request.comment
        && c.len() > MAX_COMMENT_LEN
    {
        return Err(BookingError::LimitExceeded("comment too long"));
    }

    check_fresh(model, venue, &request.zone_ids, &request.span, None)?;

    Ok(Reservation {
        id: request.id,
        event_id: request.event_id,
        venue_id: request.venue_id,
        zone_ids: request.zone_ids.clone(),
        span: request.span,
        comment: request.comment.clone(),
    })
}

/// Move `reservation` to `span`, applying the same rules as `build` while ignoring the
/// reservation's own current footprint.
pub fn reschedule(model: &ResourceModel, reservation: &Reservation, span: Span) -> Result<Reservation, BookingError> {
    if span.start >= span.end {
        return Err(BookingError::InvalidInterval {
            start: span.start,
            end: span.end,
        });
    }
    let venue = model
        .venue(&reservation.venue_id)
        .ok_or(BookingError::UnknownVenue(reservation.venue_id))?;
    check_zones_belong(model, venue, &reservation.zone_ids)?;
    check_fresh(model, venue, &reservation.zone_ids, &span, Some(reservation.id))?;

    Ok(Reservation {
        span,
        ..reservation.clone()
    })
}

fn check_zones_belong(model: &ResourceModel, venue: &VenueEntry, zone_ids: &BTreeSet<Ulid>) -> Result<(), BookingError> {
    for zone_id in zone_ids {
        let zone = model
            .zone(zone_id)
            .ok_or(BookingError::UnknownZone(*zone_id))?;
        if zone.info.venue_id != venue.info.id {
            return Err(BookingError::CrossVenueZone {
                zone_id: *zone_id,
                venue_id: venue.info.id,
            });
        }
    }
    Ok(())
}

/// The occupancies a booking of `zone_ids` competes with: the venue's own
/// whole-venue reservations, plus every zone for a whole-venue booking or just the
/// requested zones otherwise.
fn competing<'a>(model: &'a ResourceModel, venue: &'a VenueEntry, zone_ids: &'a BTreeSet<Ulid>) -> Vec<&'a Occupancy> {
    let mut occupancies = vec![&venue.occupancy];
    if zone_ids.is_empty() {
        occupancies.extend(model.zones_of(venue).map(|z| &z.occupancy));
    } else {
        occupancies.extend(zone_ids.iter().filter_map(|id| model.zone(id)).map(|z| &z.occupancy));
    }
    occupancies
}

fn check_fresh(
    model: &ResourceModel,
    venue: &VenueEntry,
    zone_ids: &BTreeSet<Ulid>,
    span: &Span,
    ignore: Option<Ulid>,
) -> Result<(), BookingError> {
    let occupancies = competing(model, venue, zone_ids);
    let free = occupancies.iter().all(|occ| {
        let others: Vec<Span> = occ
            .iter()
            .filter(|b| Some(b.reservation_id) != ignore)
            .map(|b| b.span)
            .collect();
        none_overlap(span, &others)
    });
    if free {
        return Ok(());
    }

    let conflicts: BTreeSet<Ulid> = occupancies
        .iter()
        .flat_map(|occ| occ.overlapping(span))
        .map(|b| b.reservation_id)
        .filter(|id| Some(*id) != ignore)
        .collect();
    Err(BookingError::Obsolete {
        conflicts: conflicts.into_iter().collect(),
    })
}
