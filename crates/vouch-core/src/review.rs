//! Reviewer decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Approve or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Count toward the approval quorum.
    Approve,
    /// Immediately settles the request as rejected.
    Reject,
}

impl ReviewDecision {
    /// Stable wire name — also the exact token folded into the HMAC
    /// message, so it must never change.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewDecision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(CoreError::UnknownDecision(other.to_string())),
        }
    }
}

/// A single reviewer's signed decision on a request.
///
/// `signature` is hex HMAC-SHA256 over `request_id ‖ decision ‖ comments`
/// keyed with the reviewer's session secret. One reviewer gets one decision
/// per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// UUID string.
    pub id: String,
    /// The request this decision applies to.
    pub request_id: String,
    /// Reviewing session.
    pub reviewer_session_id: String,
    /// Reviewer agent name at decision time.
    pub reviewer_agent: String,
    /// The decision.
    pub decision: ReviewDecision,
    /// Free-text commentary; rejections carry the reason here.
    #[serde(default)]
    pub comments: String,
    /// Hex HMAC-SHA256 binding reviewer, request, decision and comments.
    pub signature: String,
    /// When the review was submitted.
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Build a review with a fresh UUID, signature left for the caller.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        reviewer_session_id: impl Into<String>,
        reviewer_agent: impl Into<String>,
        decision: ReviewDecision,
        comments: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            reviewer_session_id: reviewer_session_id.into(),
            reviewer_agent: reviewer_agent.into(),
            decision,
            comments: comments.into(),
            signature: String::new(),
            created_at: Utc::now(),
        }
    }
}
