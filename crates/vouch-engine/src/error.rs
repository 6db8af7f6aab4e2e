//! Engine error taxonomy.
//!
//! Every failure surfaced to callers carries a stable `kind` string — the
//! value collaborators put in the `status` field of their JSON error
//! envelope (`{"status": "<kind>", "error": "...", "command": "..."}`).

use thiserror::Error;
use vouch_core::RequestStatus;

use crate::ratelimit::RateLimitError;
use crate::rollback::RollbackError;

/// Errors from the request lifecycle engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Attachment collection failed; no request was created.
    #[error("collecting attachment {name}: {reason}")]
    Attachment {
        /// Attachment display name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// The rate limiter refused the request.
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// The requesting agent is on the blocked list.
    #[error("agent {agent} is blocked from creating requests")]
    BlockedAgent {
        /// Blocked agent name.
        agent: String,
    },

    /// The session id is unknown to the store.
    #[error("session not found: {id}")]
    SessionNotFound {
        /// The missing session id.
        id: String,
    },

    /// The review signature did not verify against the reviewer's key.
    #[error("review signature invalid for request {request_id}")]
    SignatureInvalid {
        /// The request being reviewed.
        request_id: String,
    },

    /// Reviewers may not review their own requests.
    #[error("self-review forbidden: session {session_id} created this request")]
    SelfReviewForbidden {
        /// The offending session.
        session_id: String,
    },

    /// One reviewer, one decision per request.
    #[error("duplicate review: session {session_id} already reviewed request {request_id}")]
    DuplicateReview {
        /// The request being reviewed.
        request_id: String,
        /// The repeating reviewer.
        session_id: String,
    },

    /// The request has already settled; reviews are closed.
    #[error("request is no longer reviewable (status: {status})")]
    ReviewClosed {
        /// The status that closed the review window.
        status: String,
    },

    /// No request with this id.
    #[error("request not found: {id}")]
    NotFound {
        /// The missing request id.
        id: String,
    },

    /// The request is not approved.
    #[error("request is not approved (status: {status})")]
    NotApproved {
        /// Current status.
        status: RequestStatus,
    },

    /// The request has already been executed.
    #[error("request has already been executed")]
    AlreadyExecuted,

    /// Another executor holds the execution lease.
    #[error("request is already being executed")]
    AlreadyExecuting,

    /// The approval TTL lapsed before execution began.
    #[error("approval has expired")]
    Expired,

    /// The stored command hash does not match a recomputation — the
    /// command context drifted after approval.
    #[error("command integrity violation: hash mismatch")]
    IntegrityViolation,

    /// The requestor's wait deadline passed while the request was pending.
    #[error("request {id} timed out waiting for approval")]
    Timeout {
        /// The request that timed out.
        id: String,
    },

    /// The request settled in a non-approved terminal state while waiting.
    #[error("request {id}: {status}")]
    RequestClosed {
        /// The request id.
        id: String,
        /// The terminal status it settled in.
        status: RequestStatus,
    },

    /// Rollback capture or restore failed.
    #[error(transparent)]
    Rollback(#[from] RollbackError),

    /// The per-execution log file could not be created.
    #[error("creating log file: {0}")]
    LogCreate(#[source] std::io::Error),

    /// Polling the store failed mid-wait.
    #[error("polling request state: {0}")]
    Poll(#[source] vouch_storage::StorageError),

    /// A store operation failed.
    #[error(transparent)]
    Storage(#[from] vouch_storage::StorageError),
}

impl EngineError {
    /// Stable kind string for the JSON error envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Attachment { .. } => "attachment_error",
            Self::RateLimited(_) => "rate_limited",
            Self::BlockedAgent { .. } => "blocked_agent",
            Self::SessionNotFound { .. } => "request_failed",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::SelfReviewForbidden { .. } => "self_review_forbidden",
            Self::DuplicateReview { .. } => "duplicate_review",
            Self::ReviewClosed { .. } => "review_closed",
            Self::NotFound { .. } => "not_found",
            Self::NotApproved { .. } => "not_approved",
            Self::AlreadyExecuted => "already_executed",
            Self::AlreadyExecuting => "already_executing",
            Self::Expired => "expired",
            Self::IntegrityViolation => "integrity_violation",
            Self::Timeout { .. } => "timeout",
            Self::RequestClosed { status, .. } => status.as_str(),
            Self::Rollback(e) => e.kind(),
            Self::LogCreate(_) => "log_create_failed",
            Self::Poll(_) => "poll_failed",
            Self::Storage(_) => "request_failed",
        }
    }

    /// JSON error envelope collaborators print to stdout before exiting 1.
    #[must_use]
    pub fn to_envelope(&self, command: &str) -> serde_json::Value {
        serde_json::json!({
            "status": self.kind(),
            "error": self.to_string(),
            "command": command,
        })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
