//! Approval requests and their justification / attachment payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::CommandSpec;
use crate::status::RequestStatus;
use crate::tier::RiskTier;

/// Why the requestor believes the command should run.
///
/// All fields are free text; reviewers read them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    /// Primary reason for running the command.
    #[serde(default)]
    pub reason: String,
    /// What the requestor expects the command to change.
    #[serde(default)]
    pub expected_effect: String,
    /// The larger goal this command serves.
    #[serde(default)]
    pub goal: String,
    /// Why the requestor believes the command is safe.
    #[serde(default)]
    pub safety_argument: String,
}

/// What kind of evidence an attachment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// File content attached verbatim.
    File,
    /// Output of a context-gathering command.
    Context,
    /// Screenshot or other image evidence.
    Screenshot,
}

/// Supporting evidence attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// What this attachment is.
    pub kind: AttachmentKind,
    /// Display name (file path, command line, …).
    pub name: String,
    /// Where the content lives (inline text or a file reference).
    pub content_ref: String,
}

/// A pending or settled approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// UUID string.
    pub id: String,
    /// Project the request belongs to.
    pub project_path: String,
    /// Session that submitted the request.
    pub requestor_session_id: String,
    /// Agent name at submission time (denormalized for display).
    pub requestor_agent: String,
    /// Model at submission time.
    #[serde(default)]
    pub requestor_model: String,
    /// The command the approval binds to.
    pub command: CommandSpec,
    /// Classified risk tier.
    pub risk_tier: RiskTier,
    /// Requestor-supplied justification.
    #[serde(default)]
    pub justification: Justification,
    /// Supporting evidence.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Approvals required before the request may execute (≥ 1).
    pub min_approvals: u32,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// When a still-pending request times out.
    pub request_expires_at: Option<DateTime<Utc>>,
    /// When an approval stops being executable. Set on promotion.
    pub approval_expires_at: Option<DateTime<Utc>>,
    /// Rollback capture directory, when one was taken.
    pub rollback_path: Option<String>,
}

impl Request {
    /// Build a new pending request with a fresh UUID.
    #[must_use]
    pub fn new(
        project_path: impl Into<String>,
        requestor_session_id: impl Into<String>,
        requestor_agent: impl Into<String>,
        command: CommandSpec,
        risk_tier: RiskTier,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_path: project_path.into(),
            requestor_session_id: requestor_session_id.into(),
            requestor_agent: requestor_agent.into(),
            requestor_model: String::new(),
            command,
            risk_tier,
            justification: Justification::default(),
            attachments: Vec::new(),
            min_approvals: 1,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            request_expires_at: None,
            approval_expires_at: None,
            rollback_path: None,
        }
    }

    /// First eight characters of the id, for log file names and display.
    #[must_use]
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(8);
        &self.id[..end]
    }
}
