//! Core domain types for the vouch approval broker.
//!
//! Everything the broker persists or passes between components lives here:
//! sessions, command specs, requests, reviews, executions, the risk tier
//! ordering, and the request status machine. This crate has no I/O — the
//! store, the pattern engine, and the executor consume these types.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod command;
pub mod error;
pub mod execution;
pub mod prelude;
pub mod request;
pub mod review;
pub mod session;
pub mod status;
pub mod tier;

pub use command::CommandSpec;
pub use error::{CoreError, CoreResult};
pub use execution::Execution;
pub use request::{Attachment, AttachmentKind, Justification, Request};
pub use review::{Review, ReviewDecision};
pub use session::Session;
pub use status::RequestStatus;
pub use tier::{tier_higher, RiskTier};
