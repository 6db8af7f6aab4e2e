//! Request creation — validation, classification, rate limiting, dedup.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use vouch_core::{
    Attachment, CommandSpec, Justification, Request, RequestStatus, RiskTier, Session,
};
use vouch_storage::Store;

use crate::error::{EngineError, EngineResult};
use crate::executor::compute_command_hash;
use crate::notify::{NoopNotifier, RequestNotifier};
use crate::patterns::{DefaultPatternEngine, PatternEngine};
use crate::ratelimit::{RateLimitAction, RateLimiter};

/// Approvals required per tier.
#[derive(Debug, Clone, Copy)]
pub struct MinApprovals {
    /// For `caution` requests.
    pub caution: u32,
    /// For `dangerous` requests.
    pub dangerous: u32,
    /// For `critical` requests.
    pub critical: u32,
}

impl Default for MinApprovals {
    fn default() -> Self {
        Self {
            caution: 1,
            dangerous: 1,
            critical: 2,
        }
    }
}

impl MinApprovals {
    fn for_tier(self, tier: RiskTier) -> u32 {
        match tier {
            RiskTier::Safe => 0,
            RiskTier::Caution => self.caution.max(1),
            RiskTier::Dangerous => self.dangerous.max(1),
            RiskTier::Critical => self.critical.max(1),
        }
    }
}

/// Creator configuration, injected by the collaborator at startup.
#[derive(Debug, Clone)]
pub struct CreatorConfig {
    /// Agent names that may not create requests.
    pub blocked_agents: Vec<String>,
    /// How long a request stays pending before `timeout`.
    pub request_timeout_minutes: i64,
    /// Approval TTL for caution/dangerous requests.
    pub approval_ttl_minutes: i64,
    /// Shorter approval TTL for critical requests.
    pub approval_ttl_critical_minutes: i64,
    /// Quorum sizes per tier.
    pub min_approvals: MinApprovals,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            blocked_agents: Vec::new(),
            request_timeout_minutes: 30,
            approval_ttl_minutes: 30,
            approval_ttl_critical_minutes: 5,
            min_approvals: MinApprovals::default(),
        }
    }
}

/// Input to [`RequestCreator::create`].
#[derive(Debug, Clone)]
pub struct CreateRequestOptions {
    /// The submitting session.
    pub session_id: String,
    /// Raw command text.
    pub command: String,
    /// Working directory for the command.
    pub cwd: String,
    /// Shell mode (`sh -c`) vs argv exec.
    pub shell: bool,
    /// Argv for non-shell execution.
    pub argv: Option<Vec<String>>,
    /// Requestor-supplied justification.
    pub justification: Justification,
    /// Collected evidence.
    pub attachments: Vec<Attachment>,
    /// Project the request belongs to.
    pub project_path: String,
}

/// Outcome of [`RequestCreator::create`].
#[derive(Debug, Clone)]
pub struct CreateRequestResult {
    /// The persisted request, absent on the safe bypass.
    pub request: Option<Request>,
    /// `true` when the command was safe and review was skipped entirely.
    pub skipped: bool,
    /// Rate-limit annotation under the `warn` action.
    pub warning: Option<String>,
}

/// Validates, classifies, and persists approval requests.
pub struct RequestCreator {
    store: Arc<Store>,
    limiter: RateLimiter,
    pattern_engine: Arc<dyn PatternEngine>,
    notifier: Arc<dyn RequestNotifier>,
    config: CreatorConfig,
}

impl RequestCreator {
    /// Build a creator. A `None` pattern engine selects the default rules.
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        limiter: RateLimiter,
        pattern_engine: Option<Arc<dyn PatternEngine>>,
        config: CreatorConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            pattern_engine: pattern_engine.unwrap_or_else(|| Arc::new(DefaultPatternEngine::new())),
            notifier: Arc::new(NoopNotifier),
            config,
        }
    }

    /// Set the notifier. `None` is ignored and keeps the current one.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Option<Arc<dyn RequestNotifier>>) -> Self {
        if let Some(notifier) = notifier {
            self.notifier = notifier;
        }
        self
    }

    /// Create (or dedup to) an approval request for a command.
    ///
    /// Safe-tier commands return `{skipped: true}` without persisting
    /// anything — the caller executes them directly.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotFound`], [`EngineError::BlockedAgent`],
    /// [`EngineError::RateLimited`] (under the `reject` action), or store
    /// failures.
    pub async fn create(&self, opts: CreateRequestOptions) -> EngineResult<CreateRequestResult> {
        let session = self.validate_session(&opts.session_id)?;

        // Rate limits apply before any row is written.
        let mut warning = None;
        let mut initial_status = RequestStatus::Pending;
        if let Some(limit_err) = self.limiter.check(&session.id, Utc::now())? {
            match self.limiter.action() {
                RateLimitAction::Reject => return Err(EngineError::RateLimited(limit_err)),
                RateLimitAction::Warn => warning = Some(limit_err.to_string()),
                RateLimitAction::Queue => initial_status = RequestStatus::Queued,
            }
        }

        let mut spec = CommandSpec {
            raw: opts.command,
            cwd: opts.cwd,
            shell: opts.shell,
            argv: opts.argv,
            hash: String::new(),
        };
        spec.hash = compute_command_hash(&spec);

        let classification = self.pattern_engine.classify(&spec);
        debug!(
            tier = %classification.tier,
            pattern = ?classification.pattern_id,
            "classified command"
        );

        if classification.tier == RiskTier::Safe {
            return Ok(CreateRequestResult {
                request: None,
                skipped: true,
                warning,
            });
        }

        // An identical pending request from the same session is returned
        // rather than duplicated.
        if let Some(existing) =
            self.store
                .find_pending_duplicate(&opts.project_path, &spec.hash, &session.id)?
        {
            return Ok(CreateRequestResult {
                request: Some(existing),
                skipped: false,
                warning,
            });
        }

        let now = Utc::now();
        let mut request = Request::new(
            &opts.project_path,
            &session.id,
            &session.agent_name,
            spec,
            classification.tier,
        );
        request.requestor_model = session.model.clone();
        request.justification = opts.justification;
        request.attachments = opts.attachments;
        request.min_approvals = self.config.min_approvals.for_tier(classification.tier);
        request.status = initial_status;
        request.request_expires_at =
            Some(now + Duration::minutes(self.config.request_timeout_minutes.max(1)));

        self.store.create_request(&request)?;
        if let Err(e) = self.store.touch_session(&session.id, now) {
            warn!(session = %session.id, error = %e, "touching session failed");
        }

        // Queued requests are not yet visible to reviewers; they announce
        // themselves on promotion.
        if request.status == RequestStatus::Pending {
            self.spawn_new_request_notification(request.clone());
        }

        Ok(CreateRequestResult {
            request: Some(request),
            skipped: false,
            warning,
        })
    }

    /// Block until the request is approved, settles, or the deadline hits.
    ///
    /// Polls the store every 500 ms. Queued requests are promoted to
    /// `pending` as soon as the session drops below its pending cap. On
    /// deadline the request is moved `pending → timeout`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Timeout`] on deadline,
    /// [`EngineError::RequestClosed`] when a reviewer settled the request,
    /// [`EngineError::Poll`] when the store fails mid-wait.
    pub async fn wait_for_decision(
        &self,
        request_id: &str,
        timeout: std::time::Duration,
    ) -> EngineResult<Request> {
        const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let request = self
                .store
                .get_request(request_id)
                .map_err(EngineError::Poll)?
                .ok_or_else(|| EngineError::NotFound {
                    id: request_id.to_string(),
                })?;

            match request.status {
                RequestStatus::Approved => return Ok(request),
                RequestStatus::Queued => self.try_promote_queued(&request),
                RequestStatus::Pending => {}
                status if status.is_terminal() => {
                    return Err(EngineError::RequestClosed {
                        id: request.id,
                        status,
                    })
                }
                // executing: another worker got here first; keep watching.
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                // Best-effort: someone may settle it in the same instant.
                let _ = self.store.update_request_status(
                    request_id,
                    RequestStatus::Timeout,
                    &[RequestStatus::Pending, RequestStatus::Queued],
                );
                return Err(EngineError::Timeout {
                    id: request_id.to_string(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Withdraw a request the session no longer wants decided.
    ///
    /// Only the requestor may cancel, and only while the request is still
    /// `pending` or `queued`.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown requests;
    /// [`EngineError::RequestClosed`] when the caller is not the requestor
    /// or the request has moved past the cancellable states.
    pub fn cancel(&self, request_id: &str, session_id: &str) -> EngineResult<Request> {
        let request = self
            .store
            .get_request(request_id)?
            .ok_or_else(|| EngineError::NotFound {
                id: request_id.to_string(),
            })?;
        let cancellable = matches!(
            request.status,
            RequestStatus::Pending | RequestStatus::Queued
        );
        if request.requestor_session_id != session_id || !cancellable {
            return Err(EngineError::RequestClosed {
                id: request.id,
                status: request.status,
            });
        }
        self.store.update_request_status(
            request_id,
            RequestStatus::Cancelled,
            &[RequestStatus::Pending, RequestStatus::Queued],
        )?;
        let mut cancelled = request;
        cancelled.status = RequestStatus::Cancelled;
        Ok(cancelled)
    }

    fn try_promote_queued(&self, request: &Request) {
        let below_cap = match self
            .store
            .count_pending_for_session(&request.requestor_session_id)
        {
            Ok(pending) => pending < self.limiter.max_pending(),
            Err(e) => {
                warn!(error = %e, "queue promotion check failed");
                return;
            }
        };
        if !below_cap {
            return;
        }
        match self.store.update_request_status(
            &request.id,
            RequestStatus::Pending,
            &[RequestStatus::Queued],
        ) {
            Ok(()) => {
                let mut promoted = request.clone();
                promoted.status = RequestStatus::Pending;
                self.spawn_new_request_notification(promoted);
            }
            Err(e) => debug!(request = %request.id, error = %e, "queue promotion lost race"),
        }
    }

    fn spawn_new_request_notification(&self, request: Request) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_new_request(&request).await {
                warn!(request = %request.id, error = %e, "new-request notification failed");
            }
        });
    }

    fn validate_session(&self, session_id: &str) -> EngineResult<Session> {
        let session =
            self.store
                .get_session(session_id)?
                .ok_or_else(|| EngineError::SessionNotFound {
                    id: session_id.to_string(),
                })?;
        if self
            .config
            .blocked_agents
            .iter()
            .any(|blocked| blocked == &session.agent_name)
        {
            return Err(EngineError::BlockedAgent {
                agent: session.agent_name,
            });
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimitConfig;

    fn setup(config: CreatorConfig, limits: RateLimitConfig) -> (Arc<Store>, RequestCreator, Session) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = Session::new("/proj", "agent-a", "prog", "model");
        store.create_session(&session).unwrap();
        let limiter = RateLimiter::new(Arc::clone(&store), limits);
        let creator = RequestCreator::new(Arc::clone(&store), limiter, None, config);
        (store, creator, session)
    }

    fn opts(session: &Session, command: &str) -> CreateRequestOptions {
        CreateRequestOptions {
            session_id: session.id.clone(),
            command: command.to_string(),
            cwd: "/proj".to_string(),
            shell: true,
            argv: None,
            justification: Justification::default(),
            attachments: Vec::new(),
            project_path: "/proj".to_string(),
        }
    }

    #[tokio::test]
    async fn test_safe_command_skips_review() {
        let (store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());

        let result = creator.create(opts(&session, "echo hi")).await.unwrap();
        assert!(result.skipped);
        assert!(result.request.is_none());
        // nothing persisted
        assert_eq!(store.list_pending("/proj").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_dangerous_command_persists_pending() {
        let (store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());

        let result = creator.create(opts(&session, "rm -rf ./build")).await.unwrap();
        assert!(!result.skipped);
        let request = result.request.unwrap();
        assert_eq!(request.risk_tier, RiskTier::Dangerous);
        assert_eq!(request.min_approvals, 1);
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.request_expires_at.is_some());
        assert!(!request.command.hash.is_empty());
        assert_eq!(store.list_pending("/proj").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_critical_needs_two_approvals() {
        let (_store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());

        let result = creator.create(opts(&session, "terraform destroy")).await.unwrap();
        let request = result.request.unwrap();
        assert_eq!(request.risk_tier, RiskTier::Critical);
        assert_eq!(request.min_approvals, 2);
    }

    #[tokio::test]
    async fn test_duplicate_returns_existing() {
        let (store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());

        let first = creator
            .create(opts(&session, "rm -rf ./build"))
            .await
            .unwrap()
            .request
            .unwrap();
        let second = creator
            .create(opts(&session, "rm -rf ./build"))
            .await
            .unwrap()
            .request
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_pending("/proj").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_fails() {
        let (_store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());
        let mut o = opts(&session, "rm -rf ./x");
        o.session_id = "ghost".to_string();
        let err = creator.create(o).await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_blocked_agent_fails() {
        let (_store, creator, session) = setup(
            CreatorConfig {
                blocked_agents: vec!["agent-a".to_string()],
                ..CreatorConfig::default()
            },
            RateLimitConfig::default(),
        );
        let err = creator.create(opts(&session, "rm -rf ./x")).await.unwrap_err();
        assert!(matches!(err, EngineError::BlockedAgent { .. }));
        assert_eq!(err.kind(), "blocked_agent");
    }

    #[tokio::test]
    async fn test_rate_limit_reject() {
        let (_store, creator, session) = setup(
            CreatorConfig::default(),
            RateLimitConfig {
                max_pending_per_session: 2,
                max_requests_per_minute: 0,
                action: RateLimitAction::Reject,
            },
        );

        creator.create(opts(&session, "rm -rf ./a")).await.unwrap();
        creator.create(opts(&session, "rm -rf ./b")).await.unwrap();
        let err = creator.create(opts(&session, "rm -rf ./c")).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
        assert!(err.to_string().contains("pending limit exceeded 2/2"));
    }

    #[tokio::test]
    async fn test_rate_limit_warn_annotates() {
        let (_store, creator, session) = setup(
            CreatorConfig::default(),
            RateLimitConfig {
                max_pending_per_session: 1,
                max_requests_per_minute: 0,
                action: RateLimitAction::Warn,
            },
        );

        creator.create(opts(&session, "rm -rf ./a")).await.unwrap();
        let result = creator.create(opts(&session, "rm -rf ./b")).await.unwrap();
        assert!(result.warning.is_some());
        assert_eq!(
            result.request.unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_rate_limit_queue_holds_request() {
        let (store, creator, session) = setup(
            CreatorConfig::default(),
            RateLimitConfig {
                max_pending_per_session: 1,
                max_requests_per_minute: 0,
                action: RateLimitAction::Queue,
            },
        );

        creator.create(opts(&session, "rm -rf ./a")).await.unwrap();
        let queued = creator
            .create(opts(&session, "rm -rf ./b"))
            .await
            .unwrap()
            .request
            .unwrap();
        assert_eq!(queued.status, RequestStatus::Queued);
        // queued requests are not listed as pending
        assert_eq!(store.list_pending("/proj").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wait_promotes_queued_when_capacity_frees() {
        let (store, creator, session) = setup(
            CreatorConfig::default(),
            RateLimitConfig {
                max_pending_per_session: 1,
                max_requests_per_minute: 0,
                action: RateLimitAction::Queue,
            },
        );

        let first = creator
            .create(opts(&session, "rm -rf ./a"))
            .await
            .unwrap()
            .request
            .unwrap();
        let queued = creator
            .create(opts(&session, "rm -rf ./b"))
            .await
            .unwrap()
            .request
            .unwrap();

        // Settle the first request; the queued one should promote on poll.
        store
            .update_request_status(&first.id, RequestStatus::Cancelled, &[RequestStatus::Pending])
            .unwrap();

        let err = creator
            .wait_for_decision(&queued.id, std::time::Duration::from_millis(1200))
            .await
            .unwrap_err();
        // Nobody approved it, so the wait times out — but it must have been
        // promoted to pending (and then moved to timeout by the deadline).
        assert!(matches!(err, EngineError::Timeout { .. }));
        let settled = store.get_request(&queued.id).unwrap().unwrap();
        assert_eq!(settled.status, RequestStatus::Timeout);
    }

    #[tokio::test]
    async fn test_cancel_pending_request() {
        let (store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());
        let request = creator
            .create(opts(&session, "rm -rf ./a"))
            .await
            .unwrap()
            .request
            .unwrap();

        let cancelled = creator.cancel(&request.id, &session.id).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        let loaded = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(loaded.status, RequestStatus::Cancelled);

        // settled requests cannot be cancelled again
        let err = creator.cancel(&request.id, &session.id).unwrap_err();
        assert!(matches!(err, EngineError::RequestClosed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_requires_requestor() {
        let (store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());
        let other = Session::new("/proj", "agent-b", "prog", "model");
        store.create_session(&other).unwrap();
        let request = creator
            .create(opts(&session, "rm -rf ./a"))
            .await
            .unwrap()
            .request
            .unwrap();

        let err = creator.cancel(&request.id, &other.id).unwrap_err();
        assert!(matches!(err, EngineError::RequestClosed { .. }));
        let loaded = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(loaded.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_wait_returns_closed_status() {
        let (store, creator, session) = setup(CreatorConfig::default(), RateLimitConfig::default());
        let request = creator
            .create(opts(&session, "rm -rf ./a"))
            .await
            .unwrap()
            .request
            .unwrap();
        store
            .update_request_status(&request.id, RequestStatus::Rejected, &[RequestStatus::Pending])
            .unwrap();

        let err = creator
            .wait_for_decision(&request.id, std::time::Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rejected");
    }
}
