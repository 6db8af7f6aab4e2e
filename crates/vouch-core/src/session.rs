//! Reviewer / requestor session identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An agent identity registered with the broker.
///
/// Sessions are created when an agent registers and destroyed only by an
/// explicit purge; the single mutable field is `last_active_at`.
///
/// `hmac_key` is the per-session secret used to sign reviews. It is never
/// serialized outward — the store keeps it in its own column and every
/// export path omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier.
    pub id: String,
    /// Project this session belongs to.
    pub project_path: String,
    /// Human-readable agent name (e.g. "claude-frontend").
    pub agent_name: String,
    /// Program driving the agent.
    #[serde(default)]
    pub program: String,
    /// Model identifier, free-form.
    #[serde(default)]
    pub model: String,
    /// When the session registered.
    pub created_at: DateTime<Utc>,
    /// Last time the session touched the broker.
    pub last_active_at: DateTime<Utc>,
    /// Session HMAC secret. Never exported.
    #[serde(default, skip_serializing)]
    pub hmac_key: String,
}

impl Session {
    /// Register a new session with a fresh random id and HMAC key.
    #[must_use]
    pub fn new(
        project_path: impl Into<String>,
        agent_name: impl Into<String>,
        program: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_path: project_path.into(),
            agent_name: agent_name.into(),
            program: program.into(),
            model: model.into(),
            created_at: now,
            last_active_at: now,
            hmac_key: Uuid::new_v4().simple().to_string(),
        }
    }
}
