//! Storage error types.

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The requested row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("session", "request", …).
        entity: &'static str,
        /// The missing id.
        id: String,
    },

    /// A compare-and-swap status transition lost its race.
    #[error("status transition refused for request {id}: current status is {actual}")]
    CasFailed {
        /// Request id.
        id: String,
        /// The status actually found in the row.
        actual: String,
    },

    /// An execution row already exists for the request.
    #[error("execution already recorded for request {request_id}")]
    ExecutionExists {
        /// Request id.
        request_id: String,
    },

    /// The reviewer already submitted a decision on this request.
    #[error("reviewer {reviewer} already reviewed request {request_id}")]
    DuplicateReview {
        /// Request id.
        request_id: String,
        /// Reviewer session id.
        reviewer: String,
    },

    /// A review was submitted against a request no longer pending.
    #[error("request {id} is not open for review (status: {status})")]
    RequestNotPending {
        /// Request id.
        id: String,
        /// The status the request is actually in.
        status: String,
    },

    /// A stored row failed to parse back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;
