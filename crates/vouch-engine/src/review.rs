//! Quorum review — verification, tallying, promotion.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

use vouch_core::{Request, RequestStatus, Review, ReviewDecision, RiskTier};
use vouch_storage::{StorageError, Store};

use crate::error::{EngineError, EngineResult};
use crate::notify::{NoopNotifier, RequestNotifier};

/// Review service configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReviewConfig {
    /// Approval TTL for caution/dangerous requests, in minutes.
    pub approval_ttl_minutes: i64,
    /// Shorter approval TTL for critical requests, in minutes.
    pub approval_ttl_critical_minutes: i64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            approval_ttl_minutes: 30,
            approval_ttl_critical_minutes: 5,
        }
    }
}

impl ReviewConfig {
    fn ttl_for(self, tier: RiskTier) -> Duration {
        let minutes = if tier == RiskTier::Critical {
            self.approval_ttl_critical_minutes
        } else {
            self.approval_ttl_minutes
        };
        Duration::minutes(minutes.max(1))
    }
}

/// Input to [`ReviewService::submit`].
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    /// Reviewer session id.
    pub session_id: String,
    /// Reviewer session HMAC key, used to sign the decision.
    pub session_key: String,
    /// The request being reviewed.
    pub request_id: String,
    /// Approve or reject.
    pub decision: ReviewDecision,
    /// Commentary; rejections carry their reason here.
    pub comments: String,
}

/// Outcome of a submitted review.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// The persisted review.
    pub review: Review,
    /// Approvals on the request, including this one.
    pub approvals: u32,
    /// Rejections on the request, including this one.
    pub rejections: u32,
    /// Whether the request transitioned as a result.
    pub request_status_changed: bool,
    /// The status it transitioned to, when it did.
    pub new_request_status: Option<RequestStatus>,
}

/// Appends signed reviews and promotes requests on quorum.
pub struct ReviewService {
    store: Arc<Store>,
    config: ReviewConfig,
    notifier: Arc<dyn RequestNotifier>,
}

impl ReviewService {
    /// Build a review service.
    #[must_use]
    pub fn new(store: Arc<Store>, config: ReviewConfig) -> Self {
        Self {
            store,
            config,
            notifier: Arc::new(NoopNotifier),
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

    /// Submit a review.
    ///
    /// The decision is signed with the caller-supplied session key and
    /// verified against the reviewer's *stored* key, so a caller holding a
    /// wrong or stale key produces an invalid signature. Tallying and any
    /// status transition happen inside the store transaction that appends
    /// the review: any reject settles the request as `rejected`; reaching
    /// `min_approvals` promotes it to `approved` and stamps the approval
    /// TTL (critical requests get the shorter TTL).
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::ReviewClosed`],
    /// [`EngineError::SignatureInvalid`],
    /// [`EngineError::SelfReviewForbidden`],
    /// [`EngineError::DuplicateReview`], or store failures.
    pub async fn submit(&self, opts: ReviewOptions) -> EngineResult<ReviewOutcome> {
        let (request, _reviews) = self
            .store
            .get_request_with_reviews(&opts.request_id)?
            .ok_or_else(|| EngineError::NotFound {
                id: opts.request_id.clone(),
            })?;

        if request.status != RequestStatus::Pending {
            return Err(EngineError::ReviewClosed {
                status: request.status.as_str().to_string(),
            });
        }

        let reviewer = self
            .store
            .get_session(&opts.session_id)?
            .ok_or_else(|| EngineError::SessionNotFound {
                id: opts.session_id.clone(),
            })?;

        if reviewer.id == request.requestor_session_id {
            return Err(EngineError::SelfReviewForbidden {
                session_id: reviewer.id,
            });
        }

        // Sign with the supplied key, verify against the stored key.
        let message = review_message(&opts.request_id, opts.decision, &opts.comments);
        let signature = vouch_crypto::hmac_sign(opts.session_key.as_bytes(), &message);
        if !vouch_crypto::hmac_verify(reviewer.hmac_key.as_bytes(), &message, &signature) {
            return Err(EngineError::SignatureInvalid {
                request_id: opts.request_id,
            });
        }

        let mut review = Review::new(
            &opts.request_id,
            &reviewer.id,
            &reviewer.agent_name,
            opts.decision,
            &opts.comments,
        );
        review.signature = signature;

        let config = self.config;
        let tally = self
            .store
            .create_review(&review, |req, approvals, rejections| {
                decide_transition(req, approvals, rejections, config, Utc::now())
            })
            .map_err(|e| match e {
                StorageError::DuplicateReview { request_id, reviewer } => {
                    EngineError::DuplicateReview {
                        request_id,
                        session_id: reviewer,
                    }
                }
                StorageError::RequestNotPending { status, .. } => {
                    EngineError::ReviewClosed { status }
                }
                other => EngineError::Storage(other),
            })?;

        if let Err(e) = self.store.touch_session(&reviewer.id, Utc::now()) {
            warn!(session = %reviewer.id, error = %e, "touching session failed");
        }

        match tally.new_status {
            Some(RequestStatus::Approved) => {
                self.spawn_notification(request, review.clone(), true);
            }
            Some(RequestStatus::Rejected) => {
                self.spawn_notification(request, review.clone(), false);
            }
            _ => {}
        }

        Ok(ReviewOutcome {
            review,
            approvals: tally.approvals,
            rejections: tally.rejections,
            request_status_changed: tally.new_status.is_some(),
            new_request_status: tally.new_status,
        })
    }

    fn spawn_notification(&self, request: Request, review: Review, approved: bool) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let result = if approved {
                notifier.notify_request_approved(&request, &review).await
            } else {
                notifier.notify_request_rejected(&request, &review).await
            };
            if let Err(e) = result {
                warn!(request = %request.id, error = %e, "review notification failed");
            }
        });
    }
}

/// The canonical signed message: `request_id ‖ decision ‖ comments`.
#[must_use]
pub fn review_message(request_id: &str, decision: ReviewDecision, comments: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(request_id.len() + 8 + comments.len());
    message.extend_from_slice(request_id.as_bytes());
    message.extend_from_slice(decision.as_str().as_bytes());
    message.extend_from_slice(comments.as_bytes());
    message
}

/// The transition rule evaluated inside the review transaction.
///
/// Any reject settles the request; otherwise a reached quorum promotes it
/// and stamps the approval expiry.
fn decide_transition(
    request: &Request,
    approvals: u32,
    rejections: u32,
    config: ReviewConfig,
    now: DateTime<Utc>,
) -> Option<(RequestStatus, Option<DateTime<Utc>>)> {
    if rejections > 0 {
        return Some((RequestStatus::Rejected, None));
    }
    if approvals >= request.min_approvals {
        let expires = now + config.ttl_for(request.risk_tier);
        return Some((RequestStatus::Approved, Some(expires)));
    }
    None
}
