//! Convenience re-exports for collaborators embedding the engine.

pub use crate::attachments::collect_attachments;
pub use crate::creator::{
    CreateRequestOptions, CreateRequestResult, CreatorConfig, MinApprovals, RequestCreator,
};
pub use crate::error::{EngineError, EngineResult};
pub use crate::executor::{
    combined_output, compute_command_hash, run_command, sh_join, sh_quote, ExecuteOptions,
    ExecutionOutcome, Executor,
};
pub use crate::notify::{NoopNotifier, NotifyError, NotifyResult, RequestNotifier};
pub use crate::patterns::{strip_wrappers, Classification, DefaultPatternEngine, PatternEngine};
pub use crate::ratelimit::{RateLimitAction, RateLimitConfig, RateLimitError, RateLimiter};
pub use crate::review::{ReviewConfig, ReviewOptions, ReviewOutcome, ReviewService};
pub use crate::rollback::{
    capture, cleanup_old_captures, load, restore, CaptureOptions, RestoreOptions, RollbackData,
    RollbackError,
};
