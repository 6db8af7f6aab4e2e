//! Single-fire execution of approved requests.
//!
//! The executor is the one component allowed to spawn an approved command.
//! It preflights the request ([`Executor::can_execute`]), takes the
//! execution lease with a CAS `approved → executing`, optionally captures
//! rollback state, runs the process with its output teed into a
//! per-execution log, records the `Execution` row, and settles the request
//! as `executed` or `execution_failed`.

use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vouch_core::{CommandSpec, Execution, Request, RequestStatus};
use vouch_storage::{StorageError, Store};

use crate::error::{EngineError, EngineResult};
use crate::notify::{NoopNotifier, RequestNotifier};
use crate::patterns::{DefaultPatternEngine, PatternEngine};
use crate::rollback::{self, CaptureOptions};

/// Default grace period between SIGTERM and SIGKILL on cancellation.
pub const DEFAULT_TERM_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Recompute the canonical hash for a command spec.
///
/// Thin wrapper over [`vouch_crypto::command_hash`] so callers hash a spec
/// without spelling out the field order.
#[must_use]
pub fn compute_command_hash(spec: &CommandSpec) -> String {
    vouch_crypto::command_hash(&spec.raw, &spec.cwd, spec.shell, spec.argv.as_deref())
}

/// Options for [`Executor::execute_approved`].
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// The approved request to execute.
    pub request_id: String,
    /// Directory for the per-execution log file.
    pub log_dir: PathBuf,
    /// Mirror command output to the caller's stdout.
    pub stream_output: bool,
    /// Capture rollback state before running.
    pub capture_rollback: bool,
    /// Filesystem snapshot size cap, in megabytes.
    pub max_rollback_size_mb: u64,
    /// Cancellation handle; on cancel: SIGTERM, grace, SIGKILL.
    pub cancel: CancellationToken,
    /// Grace period between SIGTERM and SIGKILL.
    pub term_grace: std::time::Duration,
}

impl ExecuteOptions {
    /// Options with everything but the essentials defaulted.
    #[must_use]
    pub fn new(request_id: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            request_id: request_id.into(),
            log_dir: log_dir.into(),
            stream_output: false,
            capture_rollback: false,
            max_rollback_size_mb: 100,
            cancel: CancellationToken::new(),
            term_grace: DEFAULT_TERM_GRACE,
        }
    }
}

/// What an execution produced.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// The persisted execution row.
    pub execution: Execution,
    /// `executed` or `execution_failed`.
    pub status: RequestStatus,
    /// Combined stdout/stderr (see [`combined_output`]).
    pub output: String,
    /// Spawn or cancellation annotation, when the run did not complete
    /// normally.
    pub error: Option<String>,
}

/// Raw result of running one command.
#[derive(Debug)]
pub struct RunOutput {
    /// Process exit code; `-1` when killed or unspawnable.
    pub exit_code: i32,
    /// Wall-clock duration.
    pub duration: std::time::Duration,
    /// Combined stdout/stderr.
    pub output: String,
    /// The run was cancelled and the process terminated.
    pub cancelled: bool,
}

/// Executes approved requests exactly once.
pub struct Executor {
    store: Arc<Store>,
    pattern_engine: Arc<dyn PatternEngine>,
    notifier: Arc<dyn RequestNotifier>,
}

impl Executor {
    /// Build an executor. A `None` pattern engine selects the default.
    #[must_use]
    pub fn new(store: Arc<Store>, pattern_engine: Option<Arc<dyn PatternEngine>>) -> Self {
        Self {
            store,
            pattern_engine: pattern_engine.unwrap_or_else(|| Arc::new(DefaultPatternEngine::new())),
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Set the notifier. `None` is ignored and keeps the current one.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Option<Arc<dyn RequestNotifier>>) -> Self {
        if let Some(notifier) = notifier {
            self.notifier = notifier;
        }
        self
    }

    /// Preflight: is this request executable right now?
    ///
    /// Returns the request on success. An approval whose TTL has lapsed is
    /// moved to `approved_expired` as a side effect.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`], [`EngineError::AlreadyExecuting`],
    /// [`EngineError::AlreadyExecuted`], [`EngineError::NotApproved`],
    /// [`EngineError::Expired`], or [`EngineError::IntegrityViolation`].
    pub fn can_execute(&self, request_id: &str) -> EngineResult<Request> {
        let request = self
            .store
            .get_request(request_id)?
            .ok_or_else(|| EngineError::NotFound {
                id: request_id.to_string(),
            })?;

        match request.status {
            RequestStatus::Executing => return Err(EngineError::AlreadyExecuting),
            RequestStatus::Executed | RequestStatus::ExecutionFailed => {
                return Err(EngineError::AlreadyExecuted)
            }
            RequestStatus::Approved => {}
            status => return Err(EngineError::NotApproved { status }),
        }

        if let Some(expires_at) = request.approval_expires_at {
            if expires_at <= Utc::now() {
                // Best-effort; a lost race means someone else expired it.
                let _ = self.store.update_request_status(
                    request_id,
                    RequestStatus::ApprovedExpired,
                    &[RequestStatus::Approved],
                );
                return Err(EngineError::Expired);
            }
        }

        if compute_command_hash(&request.command) != request.command.hash {
            return Err(EngineError::IntegrityViolation);
        }

        Ok(request)
    }

    /// Execute an approved request.
    ///
    /// The CAS `approved → executing` is the critical section: exactly one
    /// caller wins it, and the unique execution row backs it up. Rollback
    /// capture failures are logged and the execution proceeds without a
    /// capture.
    ///
    /// # Errors
    ///
    /// Everything [`Executor::can_execute`] returns, plus
    /// [`EngineError::LogCreate`] and store failures. A command that spawns
    /// and exits non-zero is *not* an error — the outcome carries the exit
    /// code and the request settles as `execution_failed`.
    pub async fn execute_approved(&self, opts: ExecuteOptions) -> EngineResult<ExecutionOutcome> {
        let request = self.can_execute(&opts.request_id)?;

        match self.store.update_request_status(
            &opts.request_id,
            RequestStatus::Executing,
            &[RequestStatus::Approved],
        ) {
            Ok(()) => {}
            Err(StorageError::CasFailed { .. }) => return Err(EngineError::AlreadyExecuting),
            Err(e) => return Err(e.into()),
        }

        let rollback_path = if opts.capture_rollback {
            self.capture_rollback(&request, opts.max_rollback_size_mb)
                .await
        } else {
            None
        };

        let log_path = match create_log_file(&opts.log_dir, &request.id) {
            Ok(path) => path,
            Err(e) => {
                // Give the approval back; nothing ran.
                let _ = self.store.update_request_status(
                    &opts.request_id,
                    RequestStatus::Approved,
                    &[RequestStatus::Executing],
                );
                return Err(EngineError::LogCreate(e));
            }
        };

        let stream: Option<Box<dyn Write + Send>> = if opts.stream_output {
            Some(Box::new(std::io::stdout()))
        } else {
            None
        };

        let started_at = Utc::now();
        let run = run_command(
            &request.command,
            &log_path,
            stream,
            &opts.cancel,
            opts.term_grace,
        )
        .await;

        let (exit_code, duration, output, error) = match run {
            Ok(out) => {
                let error = out
                    .cancelled
                    .then(|| "execution cancelled".to_string());
                (out.exit_code, out.duration, out.output, error)
            }
            Err(e) => (-1, std::time::Duration::ZERO, String::new(), Some(e.to_string())),
        };

        let mut execution = Execution::begin(&request.id, log_path.to_string_lossy());
        execution.started_at = started_at;
        execution.finished_at = Some(Utc::now());
        execution.exit_code = exit_code;
        execution.duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        execution.rollback_path = rollback_path.clone();
        self.store.create_execution(&execution)?;

        let final_status = if exit_code == 0 && error.is_none() {
            RequestStatus::Executed
        } else {
            RequestStatus::ExecutionFailed
        };
        self.store.update_request_status(
            &request.id,
            final_status,
            &[RequestStatus::Executing],
        )?;

        let notifier = Arc::clone(&self.notifier);
        let notify_request = request.clone();
        let notify_execution = execution.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify_request_executed(&notify_request, &notify_execution, exit_code)
                .await
            {
                warn!(request = %notify_request.id, error = %e, "executed notification failed");
            }
        });

        Ok(ExecutionOutcome {
            execution,
            status: final_status,
            output,
            error,
        })
    }

    /// A non-destructive preview for the request's command, when known.
    #[must_use]
    pub fn dry_run_command(&self, raw: &str) -> Option<String> {
        self.pattern_engine.dry_run(raw)
    }

    async fn capture_rollback(&self, request: &Request, max_size_mb: u64) -> Option<String> {
        let capture_opts = CaptureOptions {
            max_size_bytes: max_size_mb.saturating_mul(1024 * 1024),
        };
        match rollback::capture(request, &capture_opts).await {
            Ok(Some(data)) => {
                let path = data.rollback_path.to_string_lossy().to_string();
                if let Err(e) = self.store.set_request_rollback_path(&request.id, &path) {
                    warn!(request = %request.id, error = %e, "recording rollback path failed");
                }
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                // Capture failure does not block execution.
                warn!(request = %request.id, error = %e, "rollback capture failed");
                None
            }
        }
    }
}

/// Create the per-execution log file `<log_dir>/<ts>_<id8>.log`.
fn create_log_file(log_dir: &Path, request_id: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let short = &request_id[..request_id.len().min(8)];
    let name = format!("{}_{short}.log", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    let path = log_dir.join(name);
    std::fs::File::create(&path)?;
    Ok(path)
}

struct TeeSink {
    log: std::fs::File,
    stream: Option<Box<dyn Write + Send>>,
}

impl TeeSink {
    fn write_chunk(&mut self, chunk: &[u8]) {
        // Log writes are best-effort; losing a log line must not fail the
        // command itself.
        let _ = self.log.write_all(chunk);
        if let Some(stream) = self.stream.as_mut() {
            let _ = stream.write_all(chunk);
            let _ = stream.flush();
        }
    }
}

async fn drain(
    mut reader: impl AsyncReadExt + Unpin,
    sink: Arc<Mutex<TeeSink>>,
) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                captured.extend_from_slice(&buf[..n]);
                if let Ok(mut sink) = sink.lock() {
                    sink.write_chunk(&buf[..n]);
                }
            }
        }
    }
    captured
}

async fn terminate(child: &mut Child, grace: std::time::Duration) -> std::io::Result<std::process::ExitStatus> {
    if let Some(pid) = child.id() {
        // SIGTERM first; tokio only exposes SIGKILL directly.
        let _ = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()
            .await;
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            child.kill().await?;
            child.wait().await
        }
    }
}

/// The process-execution primitive.
///
/// Spawns `sh -c raw` (shell mode) or `argv[0] argv[1:]`, inheriting the
/// spec's working directory and the caller's environment. All output is
/// teed into the log file at `log_path` and, when given, the `stream`
/// writer; stdout and stderr are captured separately and combined with
/// [`combined_output`].
///
/// On cancellation the process receives SIGTERM, then SIGKILL after
/// `term_grace`; the returned output has `cancelled = true` and exit code
/// `-1`.
///
/// # Errors
///
/// Returns an I/O error when the log file cannot be opened or the process
/// cannot be spawned.
pub async fn run_command(
    spec: &CommandSpec,
    log_path: &Path,
    stream: Option<Box<dyn Write + Send>>,
    cancel: &CancellationToken,
    term_grace: std::time::Duration,
) -> std::io::Result<RunOutput> {
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let mut command = if spec.shell {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&spec.raw);
        c
    } else {
        let argv = spec.argv.as_deref().unwrap_or_default();
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "exec mode requires a non-empty argv",
            ));
        };
        let mut c = Command::new(program);
        c.args(args);
        c
    };
    if !spec.cwd.is_empty() {
        command.current_dir(&spec.cwd);
    }
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let start = std::time::Instant::now();
    let mut child = command.spawn()?;
    debug!(pid = ?child.id(), raw = %spec.raw, "spawned command");

    let sink = Arc::new(Mutex::new(TeeSink { log, stream }));
    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(drain(out, Arc::clone(&sink))));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(drain(err, Arc::clone(&sink))));

    let (status, cancelled) = tokio::select! {
        status = child.wait() => (status?, false),
        () = cancel.cancelled() => (terminate(&mut child, term_grace).await?, true),
    };

    let stdout_buf = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr_buf = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let exit_code = if cancelled {
        -1
    } else {
        status.code().unwrap_or(-1)
    };

    Ok(RunOutput {
        exit_code,
        duration: start.elapsed(),
        output: combined_output(
            &String::from_utf8_lossy(&stdout_buf),
            &String::from_utf8_lossy(&stderr_buf),
        ),
        cancelled,
    })
}

/// Combine captured stdout and stderr into one block.
///
/// The stderr section is appended only when stderr is non-empty; both
/// sides lose their trailing whitespace.
#[must_use]
pub fn combined_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{stdout}\n--- stderr ---\n{stderr}")
    }
}

/// Quote one token for `sh`.
///
/// Empty becomes `''`; tokens made of safe characters pass through;
/// everything else is single-quote wrapped with embedded quotes escaped as
/// `'\''`. Single quotes are the one true form — double quotes would
/// invite variable expansion.
#[must_use]
pub fn sh_quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }
    let safe = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if safe {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\\''"))
}

/// Join argv into a shell-safe command line.
#[must_use]
pub fn sh_join(argv: &[String]) -> String {
    argv.iter()
        .map(|t| sh_quote(t))
        .collect::<Vec<_>>()
        .join(" ")
}
