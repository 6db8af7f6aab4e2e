//! Vouch Engine — the request lifecycle core of the approval broker.
//!
//! An agent submits a command through the [`creator::RequestCreator`]; the
//! [`patterns::PatternEngine`] classifies its risk; non-safe commands wait
//! for a quorum of reviews through the [`review::ReviewService`]; the
//! [`executor::Executor`] fires an approved request exactly once, with
//! optional pre-execution state capture by the [`rollback`] module so
//! destructive effects can be undone.
//!
//! The engine owns no processes or sockets beyond the commands it is asked
//! to run: collaborators (CLI, TUI, daemon, mail transport) compose with it
//! through the store, the [`notify::RequestNotifier`] trait, and
//! [`executor::run_command`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod attachments;
pub mod config_bridge;
pub mod creator;
pub mod error;
pub mod executor;
pub mod notify;
pub mod patterns;
pub mod paths;
pub mod prelude;
pub mod ratelimit;
pub mod review;
pub mod rollback;

pub use error::{EngineError, EngineResult};
pub use executor::{compute_command_hash, Executor};
pub use notify::{NoopNotifier, RequestNotifier};
pub use patterns::{Classification, DefaultPatternEngine, PatternEngine};
pub use ratelimit::{RateLimitAction, RateLimitConfig, RateLimitError, RateLimiter};
