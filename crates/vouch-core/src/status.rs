//! Request status machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle state of a request.
///
/// ```text
/// pending ──approve_quorum──▶ approved ──exec_begin──▶ executing
///   │                          │                          ├─ok──▶ executed
///   │                          │                          └─err─▶ execution_failed
///   │                          └─ttl_expired──▶ approved_expired
///   ├─any_reject──▶ rejected
///   ├─deadline_reached──▶ timeout
///   └─explicit_cancel──▶ cancelled
/// ```
///
/// `queued` is the rate-limiter's holding state: the request exists but has
/// not been dispatched to reviewers; it promotes to `pending` when the
/// session drops below its pending cap. All transitions go through the
/// store's compare-and-swap so a terminal state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting reviewer decisions.
    Pending,
    /// Held back by the rate limiter, not yet visible to reviewers.
    Queued,
    /// Quorum reached; executable until the approval TTL lapses.
    Approved,
    /// An executor holds the single execution lease.
    Executing,
    /// Ran to completion with exit code 0.
    Executed,
    /// Ran and exited non-zero (or was cancelled mid-flight).
    ExecutionFailed,
    /// Approved but never executed before the TTL lapsed.
    ApprovedExpired,
    /// At least one reviewer rejected.
    Rejected,
    /// The requestor's wait deadline passed while still pending.
    Timeout,
    /// Withdrawn by the requestor.
    Cancelled,
}

impl RequestStatus {
    /// Stable wire name (snake_case).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::ExecutionFailed => "execution_failed",
            Self::ApprovedExpired => "approved_expired",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states are sinks: no transition ever leaves them.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ApprovedExpired
                | Self::Rejected
                | Self::Timeout
                | Self::Executed
                | Self::ExecutionFailed
                | Self::Cancelled
        )
    }

    /// Whether a quorum of approvals has been reached in this state.
    ///
    /// Holds for every state at or past `approved` that was not reached by
    /// rejection, timeout, or cancellation.
    #[must_use]
    pub const fn is_approved_lineage(self) -> bool {
        matches!(
            self,
            Self::Approved
                | Self::Executing
                | Self::Executed
                | Self::ExecutionFailed
                | Self::ApprovedExpired
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "approved" => Ok(Self::Approved),
            "executing" => Ok(Self::Executing),
            "executed" => Ok(Self::Executed),
            "execution_failed" => Ok(Self::ExecutionFailed),
            "approved_expired" => Ok(Self::ApprovedExpired),
            "rejected" => Ok(Self::Rejected),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RequestStatus; 10] = [
        RequestStatus::Pending,
        RequestStatus::Queued,
        RequestStatus::Approved,
        RequestStatus::Executing,
        RequestStatus::Executed,
        RequestStatus::ExecutionFailed,
        RequestStatus::ApprovedExpired,
        RequestStatus::Rejected,
        RequestStatus::Timeout,
        RequestStatus::Cancelled,
    ];

    #[test]
    fn test_terminal_set() {
        let terminal: Vec<_> = ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal.len(), 6);
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Queued.is_terminal());
        assert!(!RequestStatus::Approved.is_terminal());
        assert!(!RequestStatus::Executing.is_terminal());
    }

    #[test]
    fn test_approved_lineage() {
        assert!(RequestStatus::Executed.is_approved_lineage());
        assert!(RequestStatus::ApprovedExpired.is_approved_lineage());
        assert!(!RequestStatus::Rejected.is_approved_lineage());
        assert!(!RequestStatus::Pending.is_approved_lineage());
        assert!(!RequestStatus::Timeout.is_approved_lineage());
    }

    #[test]
    fn test_round_trip() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<RequestStatus>().unwrap(), s);
        }
        assert!("limbo".parse::<RequestStatus>().is_err());
    }
}
