//! Command hashing and HMAC signing.
//!
//! Two small primitives with strict canonical forms:
//!
//! - [`command_hash`] — the SHA-256 fingerprint that binds an approval to
//!   an exact `(raw, cwd, argv, shell)` invocation context. Deterministic
//!   across processes: a reviewer and a requestor must reach the same hex
//!   string or the approval is invalid.
//! - [`hmac_sign`] / [`hmac_verify`] — HMAC-SHA256 review signatures keyed
//!   with the reviewer's session secret, verified in constant time.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod hash;
pub mod sign;

pub use hash::command_hash;
pub use sign::{hmac_sign, hmac_verify};
