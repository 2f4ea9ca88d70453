use crate::model::Ms;

/// Venue and zone names.
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_COMMENT_LEN: usize = 1028;
pub const MAX_DESCRIPTION_LEN: usize = 1028;

pub const MAX_VENUES: usize = 10_000;
pub const MAX_ZONES_PER_VENUE: usize = 256;
pub const MAX_RESERVATIONS: usize = 1_000_000;

/// 2000-01-01T00:00:00 and 2100-01-01T00:00:00, naive local time.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single reservation may not run longer than a year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

/// Availability queries are limited to one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
