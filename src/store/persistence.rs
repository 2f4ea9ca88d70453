use async_trait::async_trait;
use ulid::Ulid;

use crate::booking::ResourceModel;
use crate::model::{EventInfo, Reservation};

use super::{Store, StoreError};

/// What the booking service needs from storage. Each read is a single point-in-time
/// view; `persist_reservation` must reject a reservation that overlaps one it already
/// holds with `StoreError::Conflict`.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load_venue_snapshot(&self) -> Result<ResourceModel, StoreError>;

    async fn load_zone_reservations(&self, zone_id: Ulid) -> Result<Vec<Reservation>, StoreError>;

    async fn load_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError>;

    async fn load_event(&self, id: Ulid) -> Result<Option<EventInfo>, StoreError>;

    async fn persist_reservation(&self, reservation: Reservation) -> Result<(), StoreError>;

    async fn reschedule_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;

    async fn remove_reservation(&self, id: Ulid) -> Result<(), StoreError>;
}

#[async_trait]
impl Persistence for Store {
    async fn load_venue_snapshot(&self) -> Result<ResourceModel, StoreError> {
        self.snapshot().await
    }

    async fn load_zone_reservations(&self, zone_id: Ulid) -> Result<Vec<Reservation>, StoreError> {
        self.zone_reservations(zone_id).await
    }

    async fn load_reservation(&self, id: Ulid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.get_reservation(id).await)
    }

    async fn load_event(&self, id: Ulid) -> Result<Option<EventInfo>, StoreError> {
        Ok(self.get_event(id).await)
    }

    async fn persist_reservation(&self, reservation: Reservation) -> Result<(), StoreError> {
        self.insert_reservation(reservation).await
    }

    async fn reschedule_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.update_reservation_span(reservation.id, reservation.span).await
    }

    async fn remove_reservation(&self, id: Ulid) -> Result<(), StoreError> {
        self.cancel_reservation(id).await
    }
}
