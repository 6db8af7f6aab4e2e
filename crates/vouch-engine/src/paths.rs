//! Per-project on-disk layout.
//!
//! ```text
//! <project>/.vouch/
//!   state.db
//!   logs/<ts>_<prefix>.log
//!   rollback/req-<id>/{meta.json, fs/..., git/..., k8s/...}
//! ```

use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".vouch";

/// `<project>/.vouch`
#[must_use]
pub fn state_dir(project: &Path) -> PathBuf {
    project.join(STATE_DIR)
}

/// `<project>/.vouch/state.db`
#[must_use]
pub fn db_path(project: &Path) -> PathBuf {
    state_dir(project).join("state.db")
}

/// `<project>/.vouch/logs`
#[must_use]
pub fn logs_dir(project: &Path) -> PathBuf {
    state_dir(project).join("logs")
}

/// `<project>/.vouch/rollback`
#[must_use]
pub fn rollback_root(project: &Path) -> PathBuf {
    state_dir(project).join("rollback")
}

/// `<project>/.vouch/rollback/req-<id>` — owned exclusively by the one
/// execution of that request.
#[must_use]
pub fn rollback_dir(project: &Path, request_id: &str) -> PathBuf {
    rollback_root(project).join(format!("req-{request_id}"))
}
