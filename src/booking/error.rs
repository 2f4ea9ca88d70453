use ulid::Ulid;

use crate::model::Ms;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// `start >= end`.
    InvalidInterval { start: Ms, end: Ms },
    /// A requested zone belongs to a different venue.
    CrossVenueZone { zone_id: Ulid, venue_id: Ulid },
    UnknownVenue(Ulid),
    UnknownZone(Ulid),
    UnknownReservation(Ulid),
    /// No venue or zone combination qualifies. An expected outcome, not a fault.
    Unavailable,
    /// The selection was free when resolved but a conflicting reservation has
    /// appeared since. Re-resolve and retry.
    Obsolete { conflicts: Vec<Ulid> },
    /// The store rejected the write after re-validation passed.
    PersistenceConflict(Ulid),
    EndsBeforeEvent { end: Ms, event_start: Ms },
    /// The wizard's window opens before the earliest allowed start.
    StartsInPast { start: Ms, earliest: Ms },
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl BookingError {
    /// True for failures caused by a concurrent change; the caller should re-run
    /// availability and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::Obsolete { .. } | BookingError::PersistenceConflict(_)
        )
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(id) => BookingError::PersistenceConflict(id),
            other => BookingError::Store(other),
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            BookingError::CrossVenueZone { zone_id, venue_id } => {
                write!(f, "zone {zone_id} does not belong to venue {venue_id}")
            }
            BookingError::UnknownVenue(id) => write!(f, "unknown venue: {id}"),
            BookingError::UnknownZone(id) => write!(f, "unknown zone: {id}"),
            BookingError::UnknownReservation(id) => write!(f, "unknown reservation: {id}"),
            BookingError::Unavailable => write!(f, "no qualifying option for the requested window"),
            BookingError::Obsolete { conflicts } => {
                write!(f, "selection is no longer available, please retry; conflicts: ")?;
                let ids: Vec<String> = conflicts.iter().map(Ulid::to_string).collect();
                write!(f, "{}", ids.join(", "))
            }
            BookingError::PersistenceConflict(id) => {
                write!(f, "selection is no longer available, please retry; storage conflict with reservation {id}")
            }
            BookingError::EndsBeforeEvent { end, event_start } => {
                write!(f, "window ends at {end}, before the event starts at {event_start}")
            }
            BookingError::StartsInPast { start, earliest } => {
                write!(f, "window starts at {start}, before the earliest allowed start {earliest}")
            }
            BookingError::InvalidTransition { state, action } => {
                write!(f, "cannot {action} while in state {state}")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}
