use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;

use super::builder::BookingRequest;
use super::resolver::{find_available, zone_states, AvailabilityMode, AvailabilityResult, ZoneState};
use super::snapshot::ResourceModel;
use super::BookingError;

/// Where the booking dialogue currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardState {
    CollectWindow,
    ChooseVenue {
        window: Span,
        options: Vec<AvailabilityResult>,
    },
    ChooseZones {
        window: Span,
        venue: VenueInfo,
        zones: Vec<ZoneState>,
    },
    Confirm {
        window: Span,
        venue: VenueInfo,
        zone_ids: BTreeSet<Ulid>,
    },
    Done,
}

impl WizardState {
    pub fn name(&self) -> &'static str {
        match self {
            WizardState::CollectWindow => "collect_window",
            WizardState::ChooseVenue { .. } => "choose_venue",
            WizardState::ChooseZones { .. } => "choose_zones",
            WizardState::Confirm { .. } => "confirm",
            WizardState::Done => "done",
        }
    }
}

/// Linear booking dialogue for one event:
/// `CollectWindow → ChooseVenue → ChooseZones (venues with zones only) → Confirm`.
///
/// Every step is guarded by the resolver; the final step hands back a
/// [`BookingRequest`] for the booking service to build and persist.
#[derive(Debug, Clone)]
pub struct Wizard {
    event: EventInfo,
    state: WizardState,
    not_before: Option<Ms>,
}

impl Wizard {
    pub fn new(event: EventInfo) -> Self {
        Self {
            event,
            state: WizardState::CollectWindow,
            not_before: None,
        }
    }

    /// Refuse windows starting before `earliest`, normally the planner's current
    /// local time.
    pub fn not_before(mut self, earliest: Ms) -> Self {
        self.not_before = Some(earliest);
        self
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn event(&self) -> &EventInfo {
        &self.event
    }

    pub fn submit_window(&mut self, start: Ms, end: Ms, model: &ResourceModel) -> Result<Vec<AvailabilityResult>, BookingError> {
        if self.state != WizardState::CollectWindow {
            return Err(self.invalid("submit window"));
        }
        let window = Span::new(start, end)?;
        if let Some(earliest) = self.not_before
            && window.start < earliest
        {
            return Err(BookingError::StartsInPast {
                start: window.start,
                earliest,
            });
        }
        if window.end < self.event.start_at {
            return Err(BookingError::EndsBeforeEvent {
                end: window.end,
                event_start: self.event.start_at,
            });
        }
        let options = find_available(&window, model);
        if options.is_empty() {
            return Err(BookingError::Unavailable);
        }
        self.state = WizardState::ChooseVenue {
            window,
            options: options.clone(),
        };
        Ok(options)
    }

    pub fn choose_venue(&mut self, venue_id: Ulid, model: &ResourceModel) -> Result<(), BookingError> {
        let WizardState::ChooseVenue { window, options } = &self.state else {
            return Err(self.invalid("choose venue"));
        };
        let window = *window;
        let option = options
            .iter()
            .find(|o| o.venue.id == venue_id)
            .ok_or(BookingError::Unavailable)?;
        let venue = option.venue.clone();

        self.state = match option.mode {
            AvailabilityMode::WholeVenue => WizardState::Confirm {
                window,
                venue,
                zone_ids: BTreeSet::new(),
            },
            AvailabilityMode::PartialZones(_) => {
                let zones = zone_states(&window, model, venue_id)?;
                WizardState::ChooseZones { window, venue, zones }
            }
        };
        Ok(())
    }

    /// Pick zones from the zone step. An empty selection books the whole venue, which
    /// is only possible while every zone is free.
    pub fn choose_zones(&mut self, zone_ids: impl IntoIterator<Item = Ulid>) -> Result<(), BookingError> {
        let WizardState::ChooseZones { window, venue, zones } = &self.state else {
            return Err(self.invalid("choose zones"));
        };
        let selected: BTreeSet<Ulid> = zone_ids.into_iter().collect();

        if selected.is_empty() {
            if !zones.iter().all(|z| z.free) {
                return Err(BookingError::Unavailable);
            }
        } else {
            for id in &selected {
                let state = zones.iter().find(|z| z.zone.id == *id).ok_or(BookingError::CrossVenueZone {
                    zone_id: *id,
                    venue_id: venue.id,
                })?;
                if !state.free {
                    return Err(BookingError::Unavailable);
                }
            }
        }

        self.state = WizardState::Confirm {
            window: *window,
            venue: venue.clone(),
            zone_ids: selected,
        };
        Ok(())
    }

    /// Select every zone that is currently free.
    pub fn choose_all_free_zones(&mut self) -> Result<(), BookingError> {
        let WizardState::ChooseZones { zones, .. } = &self.state else {
            return Err(self.invalid("choose zones"));
        };
        let free: Vec<Ulid> = zones.iter().filter(|z| z.free).map(|z| z.zone.id).collect();
        self.choose_zones(free)
    }

    pub fn confirm(&mut self, comment: &str) -> Result<BookingRequest, BookingError> {
        let WizardState::Confirm { window, venue, zone_ids } = &self.state else {
            return Err(self.invalid("confirm"));
        };
        let request = BookingRequest::new(venue.id, *window, zone_ids.iter().copied(), self.event.id, comment);
        self.state = WizardState::Done;
        Ok(request)
    }

    fn invalid(&self, action: &'static str) -> BookingError {
        BookingError::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }
}
