use tokio::sync::oneshot;
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Store, StoreError, Tables, WalCommand};

pub(crate) fn validate_span(span: &Span) -> Result<(), StoreError> {
    if span.start >= span.end {
        return Err(StoreError::InvalidSpan);
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(StoreError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(StoreError::LimitExceeded("span too wide"));
    }
    Ok(())
}

fn validate_name(name: &str, max: usize, what: &'static str) -> Result<(), StoreError> {
    if name.trim().is_empty() || name.len() > max {
        return Err(StoreError::LimitExceeded(what));
    }
    Ok(())
}

fn check_zones(tables: &Tables, reservation: &Reservation) -> Result<(), StoreError> {
    for zone_id in &reservation.zone_ids {
        let zone = tables.zones.get(zone_id).ok_or(StoreError::NotFound(*zone_id))?;
        if zone.venue_id != reservation.venue_id {
            return Err(StoreError::CrossVenueZone {
                zone_id: *zone_id,
                venue_id: reservation.venue_id,
            });
        }
    }
    Ok(())
}

impl Store {
    pub async fn create_venue(&self, id: Ulid, name: String) -> Result<(), StoreError> {
        validate_name(&name, MAX_NAME_LEN, "venue name must be 1..=128 bytes")?;
        let mut tables = self.tables.write().await;
        if tables.venues.len() >= MAX_VENUES {
            return Err(StoreError::LimitExceeded("too many venues"));
        }
        if tables.venues.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        if tables.venues.values().any(|v| v.name == name) {
            return Err(StoreError::DuplicateName(name));
        }
        self.commit(&mut tables, Change::VenueCreated { id, name }).await
    }

    /// Removes the venue together with its zones and reservations.
    pub async fn delete_venue(&self, id: Ulid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.venues.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let dropped = tables.reservations.values().filter(|r| r.venue_id == id).count();
        self.commit(&mut tables, Change::VenueDeleted { id }).await?;
        debug!(venue = %id, reservations = dropped, "venue deleted");
        Ok(())
    }

    pub async fn create_zone(&self, id: Ulid, venue_id: Ulid, name: String) -> Result<(), StoreError> {
        validate_name(&name, MAX_NAME_LEN, "zone name must be 1..=128 bytes")?;
        let mut tables = self.tables.write().await;
        if !tables.venues.contains_key(&venue_id) {
            return Err(StoreError::NotFound(venue_id));
        }
        if tables.zones.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let siblings: Vec<&ZoneInfo> = tables.zones_of(venue_id).collect();
        if siblings.len() >= MAX_ZONES_PER_VENUE {
            return Err(StoreError::LimitExceeded("too many zones in venue"));
        }
        if siblings.iter().any(|z| z.name == name) {
            return Err(StoreError::DuplicateName(name));
        }
        self.commit(&mut tables, Change::ZoneCreated { id, venue_id, name }).await
    }

    pub async fn delete_zone(&self, id: Ulid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.zones.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if tables.zone_in_use(&id) {
            return Err(StoreError::ZoneInUse(id));
        }
        self.commit(&mut tables, Change::ZoneDeleted { id }).await
    }

    pub async fn create_event(&self, event: EventInfo) -> Result<(), StoreError> {
        validate_name(&event.title, MAX_TITLE_LEN, "event title must be 1..=256 bytes")?;
        if let Some(d) = &event.description
            && d.len() > MAX_DESCRIPTION_LEN
        {
            return Err(StoreError::LimitExceeded("event description too long"));
        }
        if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&event.start_at) {
            return Err(StoreError::LimitExceeded("timestamp out of range"));
        }
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::AlreadyExists(event.id));
        }
        self.commit(&mut tables, Change::event_created(&event)).await
    }

    /// Removes the event and every reservation made for it.
    pub async fn delete_event(&self, id: Ulid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.events.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(&mut tables, Change::EventDeleted { id }).await
    }

    /// Store a reservation. Overlap is checked again here, under the write lock, so
    /// two writers racing on stale snapshots cannot both succeed.
    pub async fn insert_reservation(&self, reservation: Reservation) -> Result<(), StoreError> {
        validate_span(&reservation.span)?;
        if let Some(c) = &reservation.comment
            && c.len() > MAX_COMMENT_LEN
        {
            return Err(StoreError::LimitExceeded("comment too long"));
        }

        let mut tables = self.tables.write().await;
        if tables.reservations.len() >= MAX_RESERVATIONS {
            return Err(StoreError::LimitExceeded("too many reservations"));
        }
        if tables.reservations.contains_key(&reservation.id) {
            return Err(StoreError::AlreadyExists(reservation.id));
        }
        if !tables.venues.contains_key(&reservation.venue_id) {
            return Err(StoreError::NotFound(reservation.venue_id));
        }
        if !tables.events.contains_key(&reservation.event_id) {
            return Err(StoreError::NotFound(reservation.event_id));
        }
        check_zones(&tables, &reservation)?;
        if let Some(existing) = tables.first_conflict(&reservation) {
            return Err(StoreError::Conflict(existing));
        }
        self.commit(&mut tables, Change::confirmed(&reservation)).await
    }

    pub async fn update_reservation_span(&self, id: Ulid, span: Span) -> Result<(), StoreError> {
        validate_span(&span)?;
        let mut tables = self.tables.write().await;
        let mut moved = tables.reservations.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        moved.span = span;
        if let Some(existing) = tables.first_conflict(&moved) {
            return Err(StoreError::Conflict(existing));
        }
        self.commit(&mut tables, Change::ReservationRescheduled { id, span }).await
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.reservations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(&mut tables, Change::ReservationCancelled { id }).await
    }

    /// Rewrite the WAL as the minimal change list for the current tables. The read
    /// lock is held until the swap is done so no mutation can slip in between.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let tables = self.tables.read().await;
        let changes = tables.to_changes();
        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::Compact { changes, response: tx }, rx)
            .await?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        self.wal_request(WalCommand::AppendsSinceCompact { response: tx }, rx)
            .await
            .unwrap_or(0)
    }
}
