//! Configuration struct definitions.

use serde::{Deserialize, Serialize};

/// Top-level broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeouts, TTLs, and rollback knobs.
    pub general: GeneralConfig,
    /// Agent allow/deny policy.
    pub agents: AgentsConfig,
    /// Per-session request caps.
    pub rate_limits: RateLimitsConfig,
    /// Out-of-band notification settings.
    pub integrations: IntegrationsConfig,
}

/// `[general]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// How long a pending request waits for approval before timing out.
    pub request_timeout_secs: u64,
    /// Approval TTL for caution/dangerous requests, in minutes.
    pub approval_ttl_mins: i64,
    /// Shorter approval TTL for critical requests, in minutes.
    pub approval_ttl_critical_mins: i64,
    /// Capture rollback state before executing destructive commands.
    pub enable_rollback_capture: bool,
    /// Upper bound on a filesystem snapshot, in megabytes.
    pub max_rollback_size_mb: u64,
    /// How long rollback captures are retained, in hours. 0 disables cleanup.
    pub rollback_retention_hours: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 1800,
            approval_ttl_mins: 30,
            approval_ttl_critical_mins: 5,
            enable_rollback_capture: true,
            max_rollback_size_mb: 100,
            rollback_retention_hours: 72,
        }
    }
}

/// `[agents]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Agent names that may not create requests.
    pub blocked: Vec<String>,
}

/// `[rate_limits]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Maximum concurrently-pending requests per session.
    pub max_pending_per_session: u32,
    /// Maximum requests per session inside a sliding sixty-second window.
    pub max_requests_per_minute: u32,
    /// What happens when a limit is hit: "reject", "queue", or "warn".
    /// Unknown values fall back to "reject".
    pub rate_limit_action: String,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            max_pending_per_session: 5,
            max_requests_per_minute: 20,
            rate_limit_action: "reject".to_string(),
        }
    }
}

/// `[integrations]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Send agent-mail notifications on request state changes.
    pub agent_mail_enabled: bool,
    /// Mail thread requests are posted to.
    pub agent_mail_thread: String,
}
