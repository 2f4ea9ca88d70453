use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateName(String),
    /// A zone cannot be deleted while reservations reference it.
    ZoneInUse(Ulid),
    CrossVenueZone {
        zone_id: Ulid,
        venue_id: Ulid,
    },
    /// The write would overlap an existing reservation.
    Conflict(Ulid),
    InvalidSpan,
    LimitExceeded(&'static str),
    Inconsistent(String),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            StoreError::DuplicateName(name) => write!(f, "name already taken: {name}"),
            StoreError::ZoneInUse(id) => {
                write!(f, "cannot delete zone {id}: referenced by reservations")
            }
            StoreError::CrossVenueZone { zone_id, venue_id } => {
                write!(f, "zone {zone_id} does not belong to venue {venue_id}")
            }
            StoreError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            StoreError::InvalidSpan => write!(f, "span start must be before end"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Inconsistent(msg) => write!(f, "inconsistent state: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
