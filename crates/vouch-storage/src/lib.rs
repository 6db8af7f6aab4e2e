//! Vouch Storage — the broker's durable store.
//!
//! A single-file SQLite database (`<project>/.vouch/state.db`) holding
//! sessions, requests, reviews, and executions. Every multi-row mutation is
//! transactional, and status transitions are compare-and-swap on the
//! expected predecessor set, so no observer ever sees e.g. an `approved`
//! request with zero approvals.
//!
//! Tests use [`Store::open_in_memory`], which exercises identical SQL.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{ReviewTally, Store};
