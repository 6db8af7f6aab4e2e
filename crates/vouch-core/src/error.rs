//! Core error types.

use thiserror::Error;

/// Errors from parsing or validating core domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A risk tier string did not match any known tier.
    #[error("unknown risk tier: {0}")]
    UnknownTier(String),

    /// A status string did not match any known request status.
    #[error("unknown request status: {0}")]
    UnknownStatus(String),

    /// A decision string was neither approve nor reject.
    #[error("unknown review decision: {0}")]
    UnknownDecision(String),

    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
