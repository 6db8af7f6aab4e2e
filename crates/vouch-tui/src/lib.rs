//! Pure view-model helpers for the vouch dashboard.
//!
//! The terminal UI itself is an external collaborator; this crate holds
//! the layout and formatting arithmetic it shares with other frontends —
//! list windowing, selection clamping, rune-safe truncation, and relative
//! timestamps. No terminal dependencies.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod format;
pub mod viewport;

pub use format::{classify_agent_status, format_time_ago, short_id, truncate_runes, AgentStatus};
pub use viewport::{clamp_selection, window};
