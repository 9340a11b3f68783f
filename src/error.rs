//! Error taxonomy for maintq.
//!
//! Every failure is surfaced to the caller as a structured error with a
//! human-readable message; nothing is retried here.

use thiserror::Error;

use crate::model::Status;

#[derive(Debug, Error)]
pub enum Error {
    /// No credential, or the credential did not validate.
    #[error("missing or invalid credential")]
    Unauthorized,

    /// Valid credential, insufficient role.
    #[error("forbidden: {0} role required")]
    Forbidden(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid transition from {from} to {to}; valid transitions: {}", .from.allowed_display())]
    InvalidTransition { from: Status, to: Status },

    #[error("duration_hours is required when transitioning to Repaired")]
    MissingDuration,

    /// Store-reported failure, message passed through.
    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
