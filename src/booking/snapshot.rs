use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::BookingError;

#[derive(Debug, Clone)]
pub struct VenueEntry {
    pub info: VenueInfo,
    /// Zones in the order they were supplied.
    pub zone_ids: Vec<Ulid>,
    /// Whole-venue reservations only.
    pub occupancy: Occupancy,
}

impl VenueEntry {
    pub fn has_zones(&self) -> bool {
        !self.zone_ids.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ZoneEntry {
    pub info: ZoneInfo,
    pub occupancy: Occupancy,
}

/// Read-only view of venues, zones and the reservations attached to them.
///
/// Arena storage keyed by id: venues keep their input order, zones are looked up by
/// id, and reservations are reduced to `(id, span)` entries on the venue (empty zone
/// set) or on every zone they occupy. Built fresh for every query.
#[derive(Debug, Clone, Default)]
pub struct ResourceModel {
    venues: Vec<VenueEntry>,
    venue_index: HashMap<Ulid, usize>,
    zones: HashMap<Ulid, ZoneEntry>,
}

impl ResourceModel {
    pub fn from_parts<'a, V, Z, R>(venues: V, zones: Z, reservations: R) -> Result<Self, BookingError>
    where
        V: IntoIterator<Item = VenueInfo>,
        Z: IntoIterator<Item = ZoneInfo>,
        R: IntoIterator<Item = &'a Reservation>,
    {
        let mut model = ResourceModel::default();

        for info in venues {
            model.venue_index.insert(info.id, model.venues.len());
            model.venues.push(VenueEntry {
                info,
                zone_ids: Vec::new(),
                occupancy: Occupancy::new(),
            });
        }

        for info in zones {
            let idx = *model
                .venue_index
                .get(&info.venue_id)
                .ok_or(BookingError::UnknownVenue(info.venue_id))?;
            model.venues[idx].zone_ids.push(info.id);
            model.zones.insert(
                info.id,
                ZoneEntry {
                    info,
                    occupancy: Occupancy::new(),
                },
            );
        }

        for reservation in reservations {
            let idx = *model
                .venue_index
                .get(&reservation.venue_id)
                .ok_or(BookingError::UnknownVenue(reservation.venue_id))?;
            let booked = Booked {
                reservation_id: reservation.id,
                span: reservation.span,
            };
            if reservation.is_whole_venue() {
                model.venues[idx].occupancy.insert(booked);
                continue;
            }
            // Validate every zone first so a bad reservation leaves nothing behind.
            for zone_id in &reservation.zone_ids {
                let zone = model
                    .zones
                    .get(zone_id)
                    .ok_or(BookingError::UnknownZone(*zone_id))?;
                if zone.info.venue_id != reservation.venue_id {
                    return Err(BookingError::CrossVenueZone {
                        zone_id: *zone_id,
                        venue_id: reservation.venue_id,
                    });
                }
            }
            for zone_id in &reservation.zone_ids {
                if let Some(zone) = model.zones.get_mut(zone_id) {
                    zone.occupancy.insert(booked);
                }
            }
        }

        Ok(model)
    }

    /// Venues in input order.
    pub fn venues(&self) -> impl Iterator<Item = &VenueEntry> {
        self.venues.iter()
    }

    pub fn venue(&self, id: &Ulid) -> Option<&VenueEntry> {
        self.venue_index.get(id).map(|&idx| &self.venues[idx])
    }

    pub fn zone(&self, id: &Ulid) -> Option<&ZoneEntry> {
        self.zones.get(id)
    }

    /// Zones of `venue`, in the venue's zone order.
    pub fn zones_of<'a>(&'a self, venue: &'a VenueEntry) -> impl Iterator<Item = &'a ZoneEntry> {
        venue.zone_ids.iter().filter_map(|id| self.zones.get(id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn venue(name: &str) -> VenueInfo {
        VenueInfo {
            id: Ulid::new(),
            name: name.into(),
        }
    }

    fn zone(venue: &VenueInfo, name: &str) -> ZoneInfo {
        ZoneInfo {
            id: Ulid::new(),
            venue_id: venue.id,
            name: name.into(),
        }
    }

    fn reservation(venue: &VenueInfo, zones: &[&ZoneInfo], start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            event_id: Ulid::new(),
            venue_id: venue.id,
            zone_ids: zones.iter().map(|z| z.id).collect::<BTreeSet<_>>(),
            span: Span::new(start, end).unwrap(),
            comment: None,
        }
    }

    #[test]
    fn routes_reservations_to_venue_or_zones() {
        let hall = venue("Hall");
        let stage = zone(&hall, "Stage");
        let foyer = zone(&hall, "Foyer");
        let whole = reservation(&hall, &[], 0, 100);
        let both = reservation(&hall, &[&stage, &foyer], 200, 300);
        let one = reservation(&hall, &[&stage], 400, 500);

        let model = ResourceModel::from_parts(
            vec![hall.clone()],
            vec![stage.clone(), foyer.clone()],
            [&whole, &both, &one],
        )
        .unwrap();

        let v = model.venue(&hall.id).unwrap();
        assert_eq!(v.occupancy.len(), 1);
        assert_eq!(v.zone_ids, vec![stage.id, foyer.id]);
        assert_eq!(model.zone(&stage.id).unwrap().occupancy.len(), 2);
        assert_eq!(model.zone(&foyer.id).unwrap().occupancy.len(), 1);
    }

    #[test]
    fn keeps_venue_input_order() {
        let a = venue("A");
        let b = venue("B");
        let c = venue("C");
        let model =
            ResourceModel::from_parts(vec![c.clone(), a.clone(), b.clone()], vec![], []).unwrap();
        let names: Vec<&str> = model.venues().map(|v| v.info.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn rejects_cross_venue_zone() {
        let hall = venue("Hall");
        let gym = venue("Gym");
        let court = zone(&gym, "Court");
        let bad = reservation(&hall, &[&court], 0, 100);

        let result = ResourceModel::from_parts(vec![hall.clone(), gym.clone()], vec![court.clone()], [&bad]);
        assert_eq!(
            result.err(),
            Some(BookingError::CrossVenueZone {
                zone_id: court.id,
                venue_id: hall.id
            })
        );
    }

    #[test]
    fn rejects_unknown_references() {
        let hall = venue("Hall");
        let orphan = ZoneInfo {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            name: "Orphan".into(),
        };
        let result = ResourceModel::from_parts(vec![hall.clone()], vec![orphan.clone()], []);
        assert_eq!(result.err(), Some(BookingError::UnknownVenue(orphan.venue_id)));

        let ghost = zone(&hall, "Ghost");
        let r = reservation(&hall, &[&ghost], 0, 100);
        let result = ResourceModel::from_parts(vec![hall], vec![], [&r]);
        assert_eq!(result.err(), Some(BookingError::UnknownZone(ghost.id)));
    }
}
