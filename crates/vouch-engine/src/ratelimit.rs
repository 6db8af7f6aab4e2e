//! Per-session request rate limiting.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::str::FromStr;
use std::sync::Arc;

use vouch_storage::{Store, StorageResult};

/// What the creator does when a limit is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitAction {
    /// Fail the creation.
    #[default]
    Reject,
    /// Persist the request as `queued`, dispatching when capacity frees.
    Queue,
    /// Create the request anyway and annotate the response.
    Warn,
}

impl FromStr for RateLimitAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "queue" => Ok(Self::Queue),
            "warn" => Ok(Self::Warn),
            _ => Err(()),
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum concurrently-pending requests per session. 0 disables.
    pub max_pending_per_session: u32,
    /// Maximum requests per sliding sixty-second window. 0 disables.
    pub max_requests_per_minute: u32,
    /// Action on violation.
    pub action: RateLimitAction,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_pending_per_session: 5,
            max_requests_per_minute: 20,
            action: RateLimitAction::Reject,
        }
    }
}

/// A rate limit was exceeded. Both limits may apply at once.
///
/// Zero-valued maxima mean that limit was not violated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitError {
    /// Pending requests held by the session.
    pub pending: u32,
    /// The pending cap that was exceeded (0 when not exceeded).
    pub max_pending: u32,
    /// Requests created inside the sliding window.
    pub recent: u32,
    /// The per-minute cap that was exceeded (0 when not exceeded).
    pub max_per_minute: u32,
    /// When the sliding window frees up, if known.
    pub reset_at: Option<DateTime<Utc>>,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.max_pending > 0 {
            parts.push(format!(
                "pending limit exceeded {}/{}",
                self.pending, self.max_pending
            ));
        }
        if self.max_per_minute > 0 {
            parts.push(format!(
                "per-minute limit exceeded {}/{}",
                self.recent, self.max_per_minute
            ));
        }
        let mut msg = if parts.is_empty() {
            "rate limit exceeded".to_string()
        } else {
            parts.join("; ")
        };
        if let Some(reset_at) = self.reset_at {
            msg.push_str(" reset_at=");
            msg.push_str(&reset_at.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        f.write_str(&msg)
    }
}

impl std::error::Error for RateLimitError {}

/// Enforces the per-session pending cap and the sliding per-minute window.
pub struct RateLimiter {
    store: Arc<Store>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Build a limiter over the store.
    #[must_use]
    pub fn new(store: Arc<Store>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// The configured action policy.
    #[must_use]
    pub fn action(&self) -> RateLimitAction {
        self.config.action
    }

    /// The configured pending cap.
    #[must_use]
    pub fn max_pending(&self) -> u32 {
        self.config.max_pending_per_session
    }

    /// Check a prospective request. `Ok(Some(err))` means a limit is hit;
    /// what happens next is the action policy's call, not the limiter's.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn check(&self, session_id: &str, now: DateTime<Utc>) -> StorageResult<Option<RateLimitError>> {
        let mut err = RateLimitError::default();
        let mut limited = false;

        if self.config.max_pending_per_session > 0 {
            let pending = self.store.count_pending_for_session(session_id)?;
            if pending >= self.config.max_pending_per_session {
                err.pending = pending;
                err.max_pending = self.config.max_pending_per_session;
                limited = true;
            }
        }

        if self.config.max_requests_per_minute > 0 {
            let window_start = now - Duration::seconds(60);
            let recent = self.store.count_requests_since(session_id, window_start)?;
            if recent >= self.config.max_requests_per_minute {
                err.recent = recent;
                err.max_per_minute = self.config.max_requests_per_minute;
                err.reset_at = self
                    .store
                    .earliest_request_since(session_id, window_start)?
                    .map(|earliest| earliest + Duration::seconds(60));
                limited = true;
            }
        }

        Ok(limited.then_some(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vouch_core::{CommandSpec, Request, RiskTier, Session};

    #[test]
    fn test_error_message_pending() {
        let err = RateLimitError {
            pending: 10,
            max_pending: 5,
            ..Default::default()
        };
        let msg = err.to_string();
        assert!(msg.contains("pending limit exceeded"));
        assert!(msg.contains("10/5"));
    }

    #[test]
    fn test_error_message_per_minute() {
        let err = RateLimitError {
            recent: 20,
            max_per_minute: 10,
            ..Default::default()
        };
        let msg = err.to_string();
        assert!(msg.contains("per-minute limit exceeded"));
        assert!(msg.contains("20/10"));
    }

    #[test]
    fn test_error_message_both() {
        let err = RateLimitError {
            pending: 10,
            max_pending: 5,
            recent: 20,
            max_per_minute: 10,
            ..Default::default()
        };
        let msg = err.to_string();
        assert!(msg.contains("pending limit exceeded"));
        assert!(msg.contains("per-minute limit exceeded"));
        assert!(msg.contains("; "));
    }

    #[test]
    fn test_error_message_generic() {
        assert_eq!(RateLimitError::default().to_string(), "rate limit exceeded");
    }

    #[test]
    fn test_error_message_reset_at() {
        let err = RateLimitError {
            pending: 10,
            max_pending: 5,
            reset_at: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
            ..Default::default()
        };
        let msg = err.to_string();
        assert!(msg.contains("reset_at="));
        assert!(msg.contains("2024-01-15T10:30:00Z"));
    }

    fn seed_session(store: &Store) -> Session {
        let session = Session::new("/proj", "agent-a", "prog", "model");
        store.create_session(&session).unwrap();
        session
    }

    fn seed_pending(store: &Store, session: &Session, n: usize) {
        for i in 0..n {
            let mut request = Request::new(
                "/proj",
                &session.id,
                &session.agent_name,
                CommandSpec::shell(format!("rm -rf ./x{i}"), "/proj"),
                RiskTier::Dangerous,
            );
            request.command.hash = format!("h{i}");
            store.create_request(&request).unwrap();
        }
    }

    #[test]
    fn test_pending_cap() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = seed_session(&store);
        seed_pending(&store, &session, 2);

        let limiter = RateLimiter::new(
            Arc::clone(&store),
            RateLimitConfig {
                max_pending_per_session: 2,
                max_requests_per_minute: 0,
                action: RateLimitAction::Reject,
            },
        );
        let err = limiter.check(&session.id, Utc::now()).unwrap().unwrap();
        assert_eq!(err.pending, 2);
        assert_eq!(err.max_pending, 2);
        assert!(err.to_string().contains("pending limit exceeded 2/2"));
    }

    #[test]
    fn test_window_cap_sets_reset() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = seed_session(&store);
        seed_pending(&store, &session, 3);

        let limiter = RateLimiter::new(
            Arc::clone(&store),
            RateLimitConfig {
                max_pending_per_session: 0,
                max_requests_per_minute: 3,
                action: RateLimitAction::Reject,
            },
        );
        let err = limiter.check(&session.id, Utc::now()).unwrap().unwrap();
        assert_eq!(err.recent, 3);
        assert!(err.reset_at.is_some());
    }

    #[test]
    fn test_under_limits_passes() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = seed_session(&store);
        seed_pending(&store, &session, 1);

        let limiter = RateLimiter::new(Arc::clone(&store), RateLimitConfig::default());
        assert!(limiter.check(&session.id, Utc::now()).unwrap().is_none());
    }
}
