/// Error taxonomy for the booking core. Validation, conflict and
/// authorization failures surface to the caller; storage errors map to a
/// generic 500 at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Notification send failure. Deliberately not part of `Error`: the
/// dispatcher logs it and moves on, it never reaches an end user.
#[derive(Debug, thiserror::Error)]
#[error("notification transport failed: {0}")]
pub struct TransportError(pub String);
