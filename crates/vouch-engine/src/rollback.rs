//! Pre-execution state capture and hardened restore.
//!
//! Before a destructive command runs, the dispatcher inspects it and
//! applies whichever capture strategies fit — filesystem tar snapshots,
//! git head+diff, Kubernetes manifests. Strategies are independent and may
//! all apply to one command. Captures land under
//! `<project>/.vouch/rollback/req-<id>/` next to a `meta.json` describing
//! what was taken.
//!
//! Restore is security-critical: tar entries are written back only after
//! every parent directory of the target is verified to be a real
//! directory. A symlink planted anywhere in the parent chain between
//! destruction and restore aborts the whole restore, so a capture can
//! never be replayed through a link into foreign territory.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use vouch_core::Request;

use crate::paths;
use crate::patterns::strip_wrappers;

/// Relative location of the filesystem snapshot inside a capture.
const FS_TAR: &str = "fs/snapshot.tar.gz";
/// Relative location of the prefix manifest inside a capture.
const FS_MANIFEST: &str = "fs/manifest.json";
/// Relative location of the recorded git head.
const GIT_HEAD: &str = "git/head.txt";
/// Relative location of the recorded git diff.
const GIT_DIFF: &str = "git/diff.patch";

/// Errors from rollback capture or restore.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// Filesystem work failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The filesystem snapshot would exceed the configured cap.
    #[error("rollback capture exceeds size limit of {limit} bytes")]
    SizeExceeded {
        /// The configured cap.
        limit: u64,
    },

    /// A parent directory of a restore target is a symlink.
    #[error("restore refused: parent {path} is a symlink")]
    SymlinkParent {
        /// The offending parent.
        path: PathBuf,
    },

    /// A tar entry tried to escape its prefix root.
    #[error("restore refused: entry {name} escapes its capture root")]
    EntryEscape {
        /// The offending entry name.
        name: String,
    },

    /// A git or kubectl shell-out failed.
    #[error("{command} failed: {detail}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Captured stderr or status.
        detail: String,
    },

    /// meta.json or the manifest could not be (de)serialized.
    #[error("rollback metadata: {0}")]
    Metadata(String),
}

impl RollbackError {
    /// Stable kind string for the error envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SymlinkParent { .. } | Self::EntryEscape { .. } => {
                "rollback_restore_refused_symlink_parent"
            }
            _ => "rollback_capture_failed",
        }
    }
}

fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> RollbackError {
    let context = context.into();
    move |source| RollbackError::Io { context, source }
}

/// Capture options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    /// Snapshot size cap in bytes; 0 means unlimited.
    pub max_size_bytes: u64,
}

/// Restore options. Reserved for future policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {}

/// Filesystem strategy record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemRollback {
    /// Snapshot archive, relative to the capture directory.
    pub tar_gz: String,
    /// Prefix manifest, relative to the capture directory.
    pub manifest: String,
}

/// Git strategy record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRollback {
    /// HEAD commit hash at capture time.
    pub head: String,
    /// Diff file, relative to the capture directory.
    pub diff_file: String,
    /// The work tree the command targeted.
    pub workdir: String,
}

/// Kubernetes strategy record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesRollback {
    /// Captured manifests, relative to the capture directory.
    pub manifests: Vec<String>,
    /// Directory kubectl ran in (kubeconfig context resolution).
    pub cwd: String,
}

/// Everything captured for one request. Serialized as `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackData {
    /// The request this capture belongs to.
    pub request_id: String,
    /// When the capture was taken.
    pub created_at: DateTime<Utc>,
    /// Absolute capture directory. Derived from disk location, not stored.
    #[serde(skip)]
    pub rollback_path: PathBuf,
    /// Filesystem snapshot, when the command touched paths.
    pub filesystem: Option<FilesystemRollback>,
    /// Git state, when the command rewrites a work tree.
    pub git: Option<GitRollback>,
    /// Kubernetes manifests, when the command deletes resources.
    pub kubernetes: Option<KubernetesRollback>,
}

/// Result type for rollback operations.
pub type RollbackResult<T> = Result<T, RollbackError>;

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Inspect the request's command and capture whatever state the known
/// strategies can preserve. Returns `None` when no strategy applies.
///
/// # Errors
///
/// Any strategy failure aborts the capture; partial captures are removed.
pub async fn capture(
    request: &Request,
    opts: &CaptureOptions,
) -> RollbackResult<Option<RollbackData>> {
    let rollback_path =
        paths::rollback_dir(Path::new(&request.project_path), &request.id);

    let result = capture_inner(request, opts, &rollback_path).await;
    match &result {
        Ok(Some(_)) => {}
        // No strategy applied or capture failed: leave no debris behind.
        _ => {
            let _ = std::fs::remove_dir_all(&rollback_path);
        }
    }
    result
}

async fn capture_inner(
    request: &Request,
    opts: &CaptureOptions,
    rollback_path: &Path,
) -> RollbackResult<Option<RollbackData>> {
    let stripped = strip_wrappers(&request.command.raw);
    let cwd = Path::new(&request.command.cwd);
    let project = Path::new(&request.project_path);

    let mut data = RollbackData {
        request_id: request.id.clone(),
        created_at: Utc::now(),
        rollback_path: rollback_path.to_path_buf(),
        filesystem: None,
        git: None,
        kubernetes: None,
    };

    data.filesystem = capture_filesystem(&stripped, cwd, project, rollback_path, opts)?;
    data.git = capture_git(&stripped, cwd, rollback_path).await?;
    data.kubernetes = capture_kubernetes(&stripped, cwd, rollback_path).await?;

    if data.filesystem.is_none() && data.git.is_none() && data.kubernetes.is_none() {
        return Ok(None);
    }

    let meta = serde_json::to_vec_pretty(&data).map_err(|e| RollbackError::Metadata(e.to_string()))?;
    std::fs::write(rollback_path.join("meta.json"), meta)
        .map_err(io_err("writing meta.json"))?;

    debug!(request = %request.id, path = %rollback_path.display(), "rollback captured");
    Ok(Some(data))
}

/// Load a capture back from disk.
///
/// # Errors
///
/// Fails when `meta.json` is missing or malformed.
pub fn load(rollback_path: &Path) -> RollbackResult<RollbackData> {
    let meta = std::fs::read(rollback_path.join("meta.json"))
        .map_err(io_err("reading meta.json"))?;
    let mut data: RollbackData =
        serde_json::from_slice(&meta).map_err(|e| RollbackError::Metadata(e.to_string()))?;
    data.rollback_path = rollback_path.to_path_buf();
    Ok(data)
}

// -- Filesystem strategy ----------------------------------------------------

fn capture_filesystem(
    stripped: &str,
    cwd: &Path,
    project: &Path,
    rollback_path: &Path,
    opts: &CaptureOptions,
) -> RollbackResult<Option<FilesystemRollback>> {
    let targets = filesystem_targets(stripped, cwd);
    let targets: Vec<PathBuf> = targets
        .into_iter()
        .filter(|p| p.symlink_metadata().is_ok())
        .filter(|p| lexical_clean(p).starts_with(lexical_clean(project)))
        .collect();
    if targets.is_empty() {
        return Ok(None);
    }

    let fs_dir = rollback_path.join("fs");
    std::fs::create_dir_all(&fs_dir).map_err(io_err("creating fs capture dir"))?;

    let tar_path = rollback_path.join(FS_TAR);
    let tar_file = std::fs::File::create(&tar_path).map_err(io_err("creating snapshot"))?;
    let encoder = GzEncoder::new(tar_file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut manifest: BTreeMap<String, String> = BTreeMap::new();
    let mut remaining = if opts.max_size_bytes == 0 {
        u64::MAX
    } else {
        opts.max_size_bytes
    };

    for (i, target) in targets.iter().enumerate() {
        let prefix = format!("p{i}");
        manifest.insert(prefix.clone(), target.to_string_lossy().to_string());
        append_tree(&mut builder, target, Path::new(&prefix), &mut remaining, opts)?;
    }

    let encoder = builder
        .into_inner()
        .map_err(io_err("finalizing snapshot"))?;
    encoder.finish().map_err(io_err("flushing snapshot"))?;

    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| RollbackError::Metadata(e.to_string()))?;
    std::fs::write(rollback_path.join(FS_MANIFEST), manifest_json)
        .map_err(io_err("writing manifest"))?;

    Ok(Some(FilesystemRollback {
        tar_gz: FS_TAR.to_string(),
        manifest: FS_MANIFEST.to_string(),
    }))
}

/// Recursively append a path to the archive under `tar_path`.
fn append_tree(
    builder: &mut tar::Builder<GzEncoder<std::fs::File>>,
    disk_path: &Path,
    tar_path: &Path,
    remaining: &mut u64,
    opts: &CaptureOptions,
) -> RollbackResult<()> {
    let meta = disk_path
        .symlink_metadata()
        .map_err(io_err(format!("stat {}", disk_path.display())))?;
    let file_type = meta.file_type();

    if file_type.is_symlink() {
        let link_target = std::fs::read_link(disk_path)
            .map_err(io_err(format!("readlink {}", disk_path.display())))?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, tar_path, &link_target)
            .map_err(io_err(format!("archiving symlink {}", disk_path.display())))?;
        return Ok(());
    }

    if file_type.is_dir() {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(mode_bits(&meta));
        header.set_cksum();
        let dir_name = format!("{}/", tar_path.to_string_lossy());
        builder
            .append_data(&mut header, dir_name, std::io::empty())
            .map_err(io_err(format!("archiving dir {}", disk_path.display())))?;

        let mut entries: Vec<_> = std::fs::read_dir(disk_path)
            .map_err(io_err(format!("listing {}", disk_path.display())))?
            .collect::<Result<_, _>>()
            .map_err(io_err(format!("listing {}", disk_path.display())))?;
        entries.sort_by_key(std::fs::DirEntry::file_name);
        for entry in entries {
            append_tree(
                builder,
                &entry.path(),
                &tar_path.join(entry.file_name()),
                remaining,
                opts,
            )?;
        }
        return Ok(());
    }

    // Regular file.
    let size = meta.len();
    if size > *remaining {
        return Err(RollbackError::SizeExceeded {
            limit: opts.max_size_bytes,
        });
    }
    *remaining -= size;

    let mut header = tar::Header::new_gnu();
    header.set_size(size);
    header.set_mode(mode_bits(&meta));
    let file = std::fs::File::open(disk_path)
        .map_err(io_err(format!("opening {}", disk_path.display())))?;
    builder
        .append_data(&mut header, tar_path, file)
        .map_err(io_err(format!("archiving {}", disk_path.display())))?;
    Ok(())
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(_meta: &std::fs::Metadata) -> u32 {
    0o644
}

/// Syntactic scan for the paths a destructive command touches.
fn filesystem_targets(stripped: &str, cwd: &Path) -> Vec<PathBuf> {
    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    let mut raw_targets: Vec<&str> = Vec::new();

    match tokens.first().copied() {
        Some("rm") => {
            raw_targets.extend(tokens[1..].iter().copied().filter(|t| !t.starts_with('-')));
        }
        Some("mv") => {
            // Sources are what disappears; the destination stays put.
            let args: Vec<&str> = tokens[1..]
                .iter()
                .copied()
                .filter(|t| !t.starts_with('-'))
                .collect();
            if args.len() >= 2 {
                raw_targets.extend(&args[..args.len() - 1]);
            }
        }
        _ => {}
    }

    // Truncating redirects clobber their target file.
    let mut iter = tokens.iter().peekable();
    while let Some(tok) = iter.next() {
        if *tok == ">" {
            if let Some(next) = iter.peek() {
                raw_targets.push(next);
            }
        } else if let Some(rest) = tok.strip_prefix('>') {
            if !rest.is_empty() && !rest.starts_with('>') {
                raw_targets.push(rest);
            }
        }
    }

    raw_targets
        .into_iter()
        .map(|t| {
            let p = Path::new(t);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                cwd.join(p)
            }
        })
        .collect()
}

/// Component-wise path cleanup: drops `.`, resolves `..` lexically.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

// -- Git strategy -----------------------------------------------------------

fn is_git_destructive(stripped: &str) -> bool {
    stripped.starts_with("git reset --hard")
        || stripped.starts_with("git checkout .")
        || stripped.starts_with("git checkout -- .")
        || stripped.starts_with("git clean")
}

async fn capture_git(
    stripped: &str,
    cwd: &Path,
    rollback_path: &Path,
) -> RollbackResult<Option<GitRollback>> {
    if !is_git_destructive(stripped) {
        return Ok(None);
    }
    // Outside a work tree there is nothing to record.
    if run_tool(cwd, "git", &["rev-parse", "--is-inside-work-tree"])
        .await
        .is_err()
    {
        return Ok(None);
    }

    let head = run_tool(cwd, "git", &["rev-parse", "HEAD"]).await?;
    let head = head.trim().to_string();
    let diff = run_tool(cwd, "git", &["diff", "HEAD"]).await?;

    let git_dir = rollback_path.join("git");
    std::fs::create_dir_all(&git_dir).map_err(io_err("creating git capture dir"))?;
    std::fs::write(rollback_path.join(GIT_HEAD), format!("{head}\n"))
        .map_err(io_err("writing head.txt"))?;
    std::fs::write(rollback_path.join(GIT_DIFF), diff).map_err(io_err("writing diff.patch"))?;

    Ok(Some(GitRollback {
        head,
        diff_file: GIT_DIFF.to_string(),
        workdir: cwd.to_string_lossy().to_string(),
    }))
}

// -- Kubernetes strategy ----------------------------------------------------

async fn capture_kubernetes(
    stripped: &str,
    cwd: &Path,
    rollback_path: &Path,
) -> RollbackResult<Option<KubernetesRollback>> {
    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    if tokens.first() != Some(&"kubectl") || tokens.get(1) != Some(&"delete") {
        return Ok(None);
    }

    let args: Vec<&str> = tokens[2..]
        .iter()
        .copied()
        .filter(|t| !t.starts_with('-'))
        .collect();

    // Accept both `delete kind name...` and `delete kind/name` forms.
    let mut resources: Vec<(String, String)> = Vec::new();
    if args.iter().any(|a| a.contains('/')) {
        for arg in &args {
            if let Some((kind, name)) = arg.split_once('/') {
                resources.push((kind.to_string(), name.to_string()));
            }
        }
    } else if args.len() >= 2 {
        let kind = args[0];
        for name in &args[1..] {
            resources.push((kind.to_string(), (*name).to_string()));
        }
    }
    if resources.is_empty() {
        return Ok(None);
    }

    let k8s_dir = rollback_path.join("k8s");
    std::fs::create_dir_all(&k8s_dir).map_err(io_err("creating k8s capture dir"))?;

    let mut manifests = Vec::new();
    for (kind, name) in &resources {
        let yaml = run_tool(cwd, "kubectl", &["get", kind, name, "-o", "yaml"]).await?;
        let rel = format!("k8s/{kind}-{name}.yaml");
        std::fs::write(rollback_path.join(&rel), yaml)
            .map_err(io_err(format!("writing {rel}")))?;
        manifests.push(rel);
    }

    Ok(Some(KubernetesRollback {
        manifests,
        cwd: cwd.to_string_lossy().to_string(),
    }))
}

/// Run a capture/restore tool, returning stdout on success.
async fn run_tool(cwd: &Path, program: &str, args: &[&str]) -> RollbackResult<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(io_err(format!("spawning {program}")))?;
    if !output.status.success() {
        return Err(RollbackError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

/// Restore captured state.
///
/// # Errors
///
/// [`RollbackError::SymlinkParent`] when any parent of a restore target is
/// a symlink (nothing further is written), plus I/O and tool failures.
pub async fn restore(data: &RollbackData, _opts: &RestoreOptions) -> RollbackResult<()> {
    if let Some(fs) = &data.filesystem {
        restore_filesystem(data, fs)?;
    }
    if let Some(git) = &data.git {
        restore_git(data, git).await?;
    }
    if let Some(k8s) = &data.kubernetes {
        restore_kubernetes(data, k8s).await?;
    }
    Ok(())
}

fn restore_filesystem(data: &RollbackData, fs: &FilesystemRollback) -> RollbackResult<()> {
    let manifest_path = data.rollback_path.join(&fs.manifest);
    let manifest_raw = std::fs::read(&manifest_path).map_err(io_err("reading manifest"))?;
    let manifest: BTreeMap<String, String> = serde_json::from_slice(&manifest_raw)
        .map_err(|e| RollbackError::Metadata(e.to_string()))?;

    let tar_path = data.rollback_path.join(&fs.tar_gz);
    let tar_file = std::fs::File::open(&tar_path).map_err(io_err("opening snapshot"))?;
    let mut archive = tar::Archive::new(GzDecoder::new(tar_file));

    for entry in archive.entries().map_err(io_err("reading snapshot"))? {
        let mut entry = entry.map_err(io_err("reading snapshot entry"))?;
        let name = entry
            .path()
            .map_err(io_err("decoding entry path"))?
            .to_path_buf();
        let name_str = name.to_string_lossy().to_string();

        let mut components = name.components();
        let Some(Component::Normal(prefix)) = components.next() else {
            return Err(RollbackError::EntryEscape { name: name_str });
        };
        let rest = components.as_path().to_path_buf();
        if rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(RollbackError::EntryEscape { name: name_str });
        }

        let prefix = prefix.to_string_lossy().to_string();
        let root = manifest
            .get(&prefix)
            .ok_or_else(|| RollbackError::Metadata(format!("unknown prefix {prefix}")))?;
        let root = Path::new(root);
        let target = root.join(&rest);

        refuse_symlink_parents(root, &rest)?;
        // A non-symlink entry must never write through a planted link at
        // its own position either.
        let target_is_symlink = target
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if target_is_symlink && entry.header().entry_type() != tar::EntryType::Symlink {
            return Err(RollbackError::SymlinkParent {
                path: target.clone(),
            });
        }

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&target)
                    .map_err(io_err(format!("recreating {}", target.display())))?;
                set_mode(&target, entry.header().mode().unwrap_or(0o755));
            }
            tar::EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(io_err("decoding linkname"))?
                    .ok_or_else(|| RollbackError::Metadata(format!("symlink {name_str} missing linkname")))?;
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(io_err(format!("recreating {}", parent.display())))?;
                }
                let _ = std::fs::remove_file(&target);
                make_symlink(&link, &target)?;
            }
            _ => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(io_err(format!("recreating {}", parent.display())))?;
                }
                let mut contents = Vec::new();
                entry
                    .read_to_end(&mut contents)
                    .map_err(io_err(format!("reading entry {name_str}")))?;
                std::fs::write(&target, contents)
                    .map_err(io_err(format!("restoring {}", target.display())))?;
                set_mode(&target, entry.header().mode().unwrap_or(0o644));
            }
        }
    }
    Ok(())
}

/// Refuse to write through a symlinked parent.
///
/// Walks the capture root and every directory between it and the target;
/// any symlink among them aborts the restore. This is what keeps a link
/// planted between destruction and restore from teleporting the restore
/// outside the original tree.
fn refuse_symlink_parents(root: &Path, rest: &Path) -> RollbackResult<()> {
    let mut current = root.to_path_buf();
    let mut chain = vec![current.clone()];
    if let Some(parent) = rest.parent() {
        for component in parent.components() {
            current.push(component);
            chain.push(current.clone());
        }
    }
    for path in chain {
        match path.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(RollbackError::SymlinkParent { path });
            }
            // Missing ancestors get created as real directories later.
            _ => {}
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> RollbackResult<()> {
    std::os::unix::fs::symlink(link, target)
        .map_err(io_err(format!("restoring symlink {}", target.display())))
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, target: &Path) -> RollbackResult<()> {
    Err(RollbackError::Metadata(format!(
        "symlink restore unsupported on this platform: {}",
        target.display()
    )))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

async fn restore_git(data: &RollbackData, git: &GitRollback) -> RollbackResult<()> {
    let workdir = Path::new(&git.workdir);
    run_tool(workdir, "git", &["reset", "--hard", &git.head]).await?;

    let diff_path = data.rollback_path.join(&git.diff_file);
    let diff_len = std::fs::metadata(&diff_path)
        .map_err(io_err("reading diff.patch"))?
        .len();
    if diff_len > 0 {
        // After the hard reset the tree equals HEAD, so the forward patch
        // reinstates the captured worktree state.
        let diff_abs = diff_path.to_string_lossy().to_string();
        run_tool(workdir, "git", &["apply", &diff_abs]).await?;
    }
    Ok(())
}

async fn restore_kubernetes(data: &RollbackData, k8s: &KubernetesRollback) -> RollbackResult<()> {
    let cwd = Path::new(&k8s.cwd);
    for manifest in &k8s.manifests {
        let path = data.rollback_path.join(manifest).to_string_lossy().to_string();
        run_tool(cwd, "kubectl", &["apply", "-f", &path]).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Delete `req-*` capture directories older than `retention`.
///
/// A zero retention disables cleanup entirely; a missing root is a no-op.
/// Only directories whose name starts with `req-` are candidates — files
/// and foreign directories are never touched.
///
/// # Errors
///
/// Propagates directory listing failures; individual deletions are
/// best-effort.
pub fn cleanup_old_captures(
    root: &Path,
    retention: std::time::Duration,
    now: std::time::SystemTime,
) -> std::io::Result<()> {
    if retention.is_zero() {
        return Ok(());
    }
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with("req-") {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let expired = now
            .duration_since(modified)
            .map(|age| age > retention)
            .unwrap_or(false);
        if expired {
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
    Ok(())
}
