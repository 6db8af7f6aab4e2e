//! Out-of-band notification dispatch.
//!
//! The engine fires a notification at each request state transition; the
//! transport (agent mail, webhooks, …) lives outside the core. Notifier
//! failures are logged and never block state progression.

use async_trait::async_trait;
use thiserror::Error;

use vouch_core::{Execution, Request, Review};

/// A notification transport failed. Used only for logging.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Result type for notifier operations.
pub type NotifyResult = Result<(), NotifyError>;

/// Out-of-band event sink for request state transitions.
///
/// Implementations must be safe for concurrent use; the engine calls them
/// from spawned tasks and never awaits them on the critical path.
#[async_trait]
pub trait RequestNotifier: Send + Sync {
    /// A new request is pending review.
    async fn notify_new_request(&self, request: &Request) -> NotifyResult;

    /// The request reached its approval quorum.
    async fn notify_request_approved(&self, request: &Request, review: &Review) -> NotifyResult;

    /// A reviewer rejected the request.
    async fn notify_request_rejected(&self, request: &Request, review: &Review) -> NotifyResult;

    /// The request was executed (successfully or not).
    async fn notify_request_executed(
        &self,
        request: &Request,
        execution: &Execution,
        exit_code: i32,
    ) -> NotifyResult;
}

/// The default notifier: does nothing, succeeds always.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl RequestNotifier for NoopNotifier {
    async fn notify_new_request(&self, _request: &Request) -> NotifyResult {
        Ok(())
    }

    async fn notify_request_approved(&self, _request: &Request, _review: &Review) -> NotifyResult {
        Ok(())
    }

    async fn notify_request_rejected(&self, _request: &Request, _review: &Review) -> NotifyResult {
        Ok(())
    }

    async fn notify_request_executed(
        &self,
        _request: &Request,
        _execution: &Execution,
        _exit_code: i32,
    ) -> NotifyResult {
        Ok(())
    }
}
