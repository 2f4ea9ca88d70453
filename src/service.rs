//! Booking workflow over a [`Persistence`] handle: resolve availability on one
//! snapshot, re-validate on a fresh one, then let storage re-check on write.

use std::sync::Arc;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::booking::{self, AvailabilityResult, BookingError, BookingRequest, ResourceModel, Wizard, ZoneState};
use crate::limits::{MAX_QUERY_WINDOW_MS, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;
use crate::observability::{AVAILABLE_VENUES, RESERVATIONS_CONFIRMED_TOTAL, RESERVATION_CONFLICTS_TOTAL};
use crate::store::{Persistence, StoreError};

fn check_window(window: &Span) -> Result<(), BookingError> {
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("query window out of range"));
    }
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(BookingError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub struct BookingService<P> {
    store: Arc<P>,
}

impl<P> Clone for BookingService<P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<P: Persistence> BookingService<P> {
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<P> {
        &self.store
    }

    pub async fn snapshot(&self) -> Result<ResourceModel, BookingError> {
        Ok(self.store.load_venue_snapshot().await?)
    }

    pub async fn find_available(&self, window: Span) -> Result<Vec<AvailabilityResult>, BookingError> {
        check_window(&window)?;
        let model = self.snapshot().await?;
        let results = booking::find_available(&window, &model);
        metrics::histogram!(AVAILABLE_VENUES).record(results.len() as f64);
        debug!(start = window.start, end = window.end, venues = results.len(), "availability resolved");
        Ok(results)
    }

    pub async fn zone_states(&self, window: Span, venue_id: Ulid) -> Result<Vec<ZoneState>, BookingError> {
        check_window(&window)?;
        let model = self.snapshot().await?;
        booking::zone_states(&window, &model, venue_id)
    }

    /// Start a booking dialogue for an existing event. `now` is the planner's local
    /// time; windows starting earlier are refused.
    pub async fn wizard(&self, event_id: Ulid, now: Ms) -> Result<Wizard, BookingError> {
        let event = self
            .store
            .load_event(event_id)
            .await?
            .ok_or(BookingError::Store(StoreError::NotFound(event_id)))?;
        Ok(Wizard::new(event).not_before(now))
    }

    /// Turn a confirmed selection into a stored reservation.
    ///
    /// The request is re-validated against a snapshot taken now, not the one it was
    /// resolved on. A conflict found there is `Obsolete`; one only the store sees is
    /// `PersistenceConflict`. Both are for the caller to retry.
    pub async fn confirm(&self, request: &BookingRequest) -> Result<Reservation, BookingError> {
        let model = self.snapshot().await?;
        let reservation = booking::build(&model, request).inspect_err(|e| {
            if let BookingError::Obsolete { conflicts } = e {
                metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "stage" => "snapshot").increment(1);
                warn!(reservation = %request.id, ?conflicts, "selection is stale");
            }
        })?;

        self.store
            .persist_reservation(reservation.clone())
            .await
            .map_err(BookingError::from)
            .inspect_err(|e| {
                if let BookingError::PersistenceConflict(other) = e {
                    metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "stage" => "store").increment(1);
                    warn!(reservation = %request.id, conflict = %other, "lost race at write");
                }
            })?;

        metrics::counter!(RESERVATIONS_CONFIRMED_TOTAL).increment(1);
        info!(
            reservation = %reservation.id,
            venue = %reservation.venue_id,
            zones = reservation.zone_ids.len(),
            start = reservation.span.start,
            end = reservation.span.end,
            "reservation confirmed"
        );
        Ok(reservation)
    }

    pub async fn reschedule(&self, id: Ulid, span: Span) -> Result<Reservation, BookingError> {
        let current = self
            .store
            .load_reservation(id)
            .await?
            .ok_or(BookingError::UnknownReservation(id))?;
        let model = self.snapshot().await?;
        let moved = booking::reschedule(&model, &current, span)?;
        self.store.reschedule_reservation(&moved).await?;
        info!(reservation = %id, start = span.start, end = span.end, "reservation rescheduled");
        Ok(moved)
    }

    pub async fn cancel(&self, id: Ulid) -> Result<(), BookingError> {
        match self.store.remove_reservation(id).await {
            Ok(()) => {
                info!(reservation = %id, "reservation cancelled");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(BookingError::UnknownReservation(id)),
            Err(e) => Err(e.into()),
        }
    }
}
