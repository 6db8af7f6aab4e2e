//! Attachment collection for request justifications.
//!
//! Requestors can attach file contents, the output of context-gathering
//! commands, and screenshot references as evidence for reviewers. Any
//! collection failure aborts request creation with `attachment_error` —
//! a request must never be created with partial evidence.

use std::path::Path;
use tokio::process::Command;

use vouch_core::{Attachment, AttachmentKind};

use crate::error::{EngineError, EngineResult};

/// Inline attachment content cap. Bigger evidence should be referenced,
/// not embedded.
const MAX_INLINE_BYTES: u64 = 256 * 1024;

/// Collect attachments from the three evidence sources.
///
/// - `files`: paths whose content is embedded verbatim;
/// - `contexts`: shell commands whose output is embedded;
/// - `screenshots`: image paths attached by reference.
///
/// # Errors
///
/// Returns [`EngineError::Attachment`] on the first unreadable file,
/// failing context command, oversized content, or missing screenshot.
pub async fn collect_attachments(
    cwd: &Path,
    files: &[String],
    contexts: &[String],
    screenshots: &[String],
) -> EngineResult<Vec<Attachment>> {
    let mut attachments = Vec::new();

    for file in files {
        let path = resolve(cwd, file);
        let meta = std::fs::metadata(&path).map_err(|e| EngineError::Attachment {
            name: file.clone(),
            reason: e.to_string(),
        })?;
        if meta.len() > MAX_INLINE_BYTES {
            return Err(EngineError::Attachment {
                name: file.clone(),
                reason: format!("file exceeds {MAX_INLINE_BYTES} byte inline limit"),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| EngineError::Attachment {
            name: file.clone(),
            reason: e.to_string(),
        })?;
        attachments.push(Attachment {
            kind: AttachmentKind::File,
            name: file.clone(),
            content_ref: content,
        });
    }

    for command in contexts {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| EngineError::Attachment {
                name: command.clone(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(EngineError::Attachment {
                name: command.clone(),
                reason: format!(
                    "context command exited {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        if output.stdout.len() as u64 > MAX_INLINE_BYTES {
            return Err(EngineError::Attachment {
                name: command.clone(),
                reason: format!("output exceeds {MAX_INLINE_BYTES} byte inline limit"),
            });
        }
        attachments.push(Attachment {
            kind: AttachmentKind::Context,
            name: command.clone(),
            content_ref: String::from_utf8_lossy(&output.stdout).to_string(),
        });
    }

    for screenshot in screenshots {
        let path = resolve(cwd, screenshot);
        if !path.exists() {
            return Err(EngineError::Attachment {
                name: screenshot.clone(),
                reason: "screenshot file not found".to_string(),
            });
        }
        attachments.push(Attachment {
            kind: AttachmentKind::Screenshot,
            name: screenshot.clone(),
            content_ref: path.to_string_lossy().to_string(),
        });
    }

    Ok(attachments)
}

fn resolve(cwd: &Path, raw: &str) -> std::path::PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
