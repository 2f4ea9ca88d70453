//! Resource availability engine: which venues and zones are free for a window, and
//! how a confirmed selection becomes a reservation.
//!
//! Everything here is synchronous and works on an owned [`ResourceModel`] snapshot.

mod builder;
mod error;
mod resolver;
mod snapshot;
mod wizard;

pub use builder::{build, reschedule, BookingRequest};
pub use error::BookingError;
pub use resolver::{find_available, zone_states, AvailabilityMode, AvailabilityResult, ZoneState};
pub use snapshot::{ResourceModel, VenueEntry, ZoneEntry};
pub use wizard::{Wizard, WizardState};
