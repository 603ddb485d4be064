//! Error conditions surfaced by the suggestion core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuggestError {
    /// Caller input outside its allowed range (limit, days). Not retryable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing store could not be reached or is busy. Callers may retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The store rejected a write (check or foreign-key constraint).
    #[error("storage constraint violation: {0}")]
    StorageConstraintViolation(String),

    /// Any other storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl SuggestError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SuggestError::InvalidArgument(msg.into())
    }

    /// True for conditions worth retrying at the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, SuggestError::StorageUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, SuggestError>;
