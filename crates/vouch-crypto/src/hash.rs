//! Canonical command fingerprint.

use sha2::{Digest, Sha256};

/// Compute the canonical hash binding an approval to its command context.
///
/// `hash = hex(sha256(raw ‖ cwd ‖ json(argv) ‖ shell_tag))` where
/// `json(argv)` is the compact JSON encoding of the argv list (`null` when
/// absent) and `shell_tag` is `"shell"` or `"exec"`.
///
/// The JSON step makes the argv boundary unambiguous: `["ab","c"]` and
/// `["a","bc"]` hash differently even though their concatenation is equal.
#[must_use]
pub fn command_hash(raw: &str, cwd: &str, shell: bool, argv: Option<&[String]>) -> String {
    let argv_json = serde_json::to_string(&argv).unwrap_or_else(|_| "null".to_string());
    let shell_tag = if shell { "shell" } else { "exec" };

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hasher.update(cwd.as_bytes());
    hasher.update(argv_json.as_bytes());
    hasher.update(shell_tag.as_bytes());
    hex::encode(hasher.finalize())
}
