//! Command specification — the unit an approval binds to.

use serde::{Deserialize, Serialize};

/// The exact invocation a request asks permission for.
///
/// The `hash` field is the canonical SHA-256 fingerprint over
/// `(raw, cwd, argv, shell)`; reviewers and the executor recompute it
/// independently, so any drift between approval and execution invalidates
/// the approval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The textual command as the agent submitted it.
    pub raw: String,
    /// Working directory the command runs in.
    pub cwd: String,
    /// `true`: run via `sh -c raw`; `false`: exec `argv` directly.
    pub shell: bool,
    /// Explicit argv for non-shell execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argv: Option<Vec<String>>,
    /// Hex-encoded canonical hash. Empty until computed.
    #[serde(default)]
    pub hash: String,
}

impl CommandSpec {
    /// A shell-mode spec (`sh -c raw`), hash not yet computed.
    #[must_use]
    pub fn shell(raw: impl Into<String>, cwd: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            cwd: cwd.into(),
            shell: true,
            argv: None,
            hash: String::new(),
        }
    }

    /// An argv-mode spec, hash not yet computed.
    ///
    /// `raw` is kept as the display form; execution uses `argv`.
    #[must_use]
    pub fn exec(raw: impl Into<String>, cwd: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            raw: raw.into(),
            cwd: cwd.into(),
            shell: false,
            argv: Some(argv),
            hash: String::new(),
        }
    }

    /// Tag folded into the canonical hash to separate the two exec modes.
    #[must_use]
    pub const fn shell_tag(&self) -> &'static str {
        if self.shell {
            "shell"
        } else {
            "exec"
        }
    }
}
