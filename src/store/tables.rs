use std::collections::BTreeMap;

use ulid::Ulid;

use crate::model::*;

/// Everything the store knows, keyed by id. Iteration order is id order, which for
/// ULIDs is creation order.
#[derive(Debug, Default)]
pub struct Tables {
    pub venues: BTreeMap<Ulid, VenueInfo>,
    pub zones: BTreeMap<Ulid, ZoneInfo>,
    pub events: BTreeMap<Ulid, EventInfo>,
    pub reservations: BTreeMap<Ulid, Reservation>,
}

impl Tables {
    /// Apply a change that has already been validated (or is being replayed).
    /// Deletes cascade: a venue takes its zones and reservations with it, an event
    /// its reservations.
    pub fn apply(&mut self, change: &Change) {
        match change {
            Change::VenueCreated { id, name } => {
                self.venues.insert(
                    *id,
                    VenueInfo {
                        id: *id,
                        name: name.clone(),
                    },
                );
            }
            Change::VenueDeleted { id } => {
                self.venues.remove(id);
                self.zones.retain(|_, z| z.venue_id != *id);
                self.reservations.retain(|_, r| r.venue_id != *id);
            }
            Change::ZoneCreated { id, venue_id, name } => {
                self.zones.insert(
                    *id,
                    ZoneInfo {
                        id: *id,
                        venue_id: *venue_id,
                        name: name.clone(),
                    },
                );
            }
            Change::ZoneDeleted { id } => {
                self.zones.remove(id);
            }
            Change::EventCreated {
                id,
                title,
                start_at,
                description,
                scope,
            } => {
                self.events.insert(
                    *id,
                    EventInfo {
                        id: *id,
                        title: title.clone(),
                        start_at: *start_at,
                        description: description.clone(),
                        scope: *scope,
                    },
                );
            }
            Change::EventDeleted { id } => {
                self.events.remove(id);
                self.reservations.retain(|_, r| r.event_id != *id);
            }
            Change::ReservationConfirmed {
                id,
                event_id,
                venue_id,
                zone_ids,
                span,
                comment,
            } => {
                self.reservations.insert(
                    *id,
                    Reservation {
                        id: *id,
                        event_id: *event_id,
                        venue_id: *venue_id,
                        zone_ids: zone_ids.iter().copied().collect(),
                        span: *span,
                        comment: comment.clone(),
                    },
                );
            }
            Change::ReservationRescheduled { id, span } => {
                if let Some(r) = self.reservations.get_mut(id) {
                    r.span = *span;
                }
            }
            Change::ReservationCancelled { id } => {
                self.reservations.remove(id);
            }
        }
    }

    /// The shortest change list that rebuilds the current tables, parents first.
    pub fn to_changes(&self) -> Vec<Change> {
        let mut changes = Vec::with_capacity(
            self.venues.len() + self.zones.len() + self.events.len() + self.reservations.len(),
        );
        changes.extend(self.venues.values().map(|v| Change::VenueCreated {
            id: v.id,
            name: v.name.clone(),
        }));
        changes.extend(self.zones.values().map(|z| Change::ZoneCreated {
            id: z.id,
            venue_id: z.venue_id,
            name: z.name.clone(),
        }));
        changes.extend(self.events.values().map(Change::event_created));
        changes.extend(self.reservations.values().map(Change::confirmed));
        changes
    }

    pub fn zones_of(&self, venue_id: Ulid) -> impl Iterator<Item = &ZoneInfo> {
        self.zones.values().filter(move |z| z.venue_id == venue_id)
    }

    /// The first reservation that competes with `candidate` for space and time,
    /// skipping `candidate` itself.
    pub fn first_conflict(&self, candidate: &Reservation) -> Option<Ulid> {
        self.reservations
            .values()
            .find(|r| {
                r.id != candidate.id
                    && r.venue_id == candidate.venue_id
                    && r.span.overlaps(&candidate.span)
                    && footprints_collide(&r.zone_ids, &candidate.zone_ids)
            })
            .map(|r| r.id)
    }

    pub fn zone_in_use(&self, zone_id: &Ulid) -> bool {
        self.reservations.values().any(|r| r.zone_ids.contains(zone_id))
    }
}
