use ulid::Ulid;

use crate::booking::ResourceModel;
use crate::model::*;

use super::{Store, StoreError};

impl Store {
    /// Venues, zones and reservations as one consistent resource model.
    pub async fn snapshot(&self) -> Result<ResourceModel, StoreError> {
        let tables = self.tables.read().await;
        ResourceModel::from_parts(
            tables.venues.values().cloned(),
            tables.zones.values().cloned(),
            tables.reservations.values(),
        )
        .map_err(|e| StoreError::Inconsistent(e.to_string()))
    }

    /// Reservations occupying `zone_id`, ordered by start.
    pub async fn zone_reservations(&self, zone_id: Ulid) -> Result<Vec<Reservation>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.zones.contains_key(&zone_id) {
            return Err(StoreError::NotFound(zone_id));
        }
        let mut found: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.zone_ids.contains(&zone_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.span.start, r.id));
        Ok(found)
    }

    pub async fn list_venues(&self) -> Vec<VenueInfo> {
        self.tables.read().await.venues.values().cloned().collect()
    }

    pub async fn list_zones(&self, venue_id: Option<Ulid>) -> Vec<ZoneInfo> {
        let tables = self.tables.read().await;
        tables
            .zones
            .values()
            .filter(|z| venue_id.is_none_or(|v| z.venue_id == v))
            .cloned()
            .collect()
    }

    pub async fn list_events(&self) -> Vec<EventInfo> {
        self.tables.read().await.events.values().cloned().collect()
    }

    /// Reservations ordered by start, optionally narrowed to one venue and/or event.
    pub async fn list_reservations(&self, venue_id: Option<Ulid>, event_id: Option<Ulid>) -> Vec<Reservation> {
        let tables = self.tables.read().await;
        let mut found: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| venue_id.is_none_or(|v| r.venue_id == v))
            .filter(|r| event_id.is_none_or(|e| r.event_id == e))
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.span.start, r.id));
        found
    }

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        self.tables.read().await.reservations.get(&id).cloned()
    }

    pub async fn get_event(&self, id: Ulid) -> Option<EventInfo> {
        self.tables.read().await.events.get(&id).cloned()
    }
}
