//! Execution records — one per request, ever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The outcome of running an approved request.
///
/// The store enforces at most one row per request; a second insert for the
/// same `request_id` fails, which is what makes execution single-fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// UUID string.
    pub id: String,
    /// The request that was executed. Unique.
    pub request_id: String,
    /// When the process was spawned.
    pub started_at: DateTime<Utc>,
    /// When the process exited (or was killed).
    pub finished_at: Option<DateTime<Utc>>,
    /// Process exit code; `-1` when cancelled or unspawnable.
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
    /// Per-execution log file.
    pub log_path: String,
    /// Rollback capture directory, when one was taken.
    pub rollback_path: Option<String>,
}

impl Execution {
    /// Start an execution record for a request.
    #[must_use]
    pub fn begin(request_id: impl Into<String>, log_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            exit_code: 0,
            duration_ms: 0,
            log_path: log_path.into(),
            rollback_path: None,
        }
    }
}
