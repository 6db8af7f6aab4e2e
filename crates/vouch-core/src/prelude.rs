//! Convenience re-exports for downstream crates.

pub use crate::command::CommandSpec;
pub use crate::error::{CoreError, CoreResult};
pub use crate::execution::Execution;
pub use crate::request::{Attachment, AttachmentKind, Justification, Request};
pub use crate::review::{Review, ReviewDecision};
pub use crate::session::Session;
pub use crate::status::RequestStatus;
pub use crate::tier::{tier_higher, RiskTier};
