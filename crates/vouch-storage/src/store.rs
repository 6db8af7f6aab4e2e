//! SQLite-backed store implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use vouch_core::{
    Attachment, CommandSpec, Execution, Justification, Request, RequestStatus, Review, Session,
};

use crate::error::{StorageError, StorageResult};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id              TEXT PRIMARY KEY,
    project_path    TEXT NOT NULL,
    agent_name      TEXT NOT NULL,
    program         TEXT NOT NULL DEFAULT '',
    model           TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL,
    last_active_at  TEXT NOT NULL,
    hmac_key        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS requests (
    id                   TEXT PRIMARY KEY,
    project_path         TEXT NOT NULL,
    requestor_session_id TEXT NOT NULL REFERENCES sessions(id),
    requestor_agent      TEXT NOT NULL,
    requestor_model      TEXT NOT NULL DEFAULT '',
    command_raw          TEXT NOT NULL,
    command_cwd          TEXT NOT NULL,
    command_shell        INTEGER NOT NULL,
    command_argv         TEXT,
    command_hash         TEXT NOT NULL,
    risk_tier            TEXT NOT NULL,
    justification        TEXT NOT NULL DEFAULT '{}',
    attachments          TEXT NOT NULL DEFAULT '[]',
    min_approvals        INTEGER NOT NULL DEFAULT 1,
    status               TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    request_expires_at   TEXT,
    approval_expires_at  TEXT,
    rollback_path        TEXT
);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status, project_path);
CREATE INDEX IF NOT EXISTS idx_requests_session ON requests(requestor_session_id, created_at);

CREATE TABLE IF NOT EXISTS reviews (
    id                  TEXT PRIMARY KEY,
    request_id          TEXT NOT NULL REFERENCES requests(id),
    reviewer_session_id TEXT NOT NULL,
    reviewer_agent      TEXT NOT NULL,
    decision            TEXT NOT NULL,
    comments            TEXT NOT NULL DEFAULT '',
    signature           TEXT NOT NULL,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reviews_request ON reviews(request_id);

CREATE TABLE IF NOT EXISTS executions (
    id            TEXT PRIMARY KEY,
    request_id    TEXT NOT NULL UNIQUE REFERENCES requests(id),
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    exit_code     INTEGER NOT NULL DEFAULT 0,
    duration_ms   INTEGER NOT NULL DEFAULT 0,
    log_path      TEXT NOT NULL DEFAULT '',
    rollback_path TEXT
);
";

/// Tally returned by [`Store::create_review`] after the transaction commits.
#[derive(Debug, Clone, Copy)]
pub struct ReviewTally {
    /// Approve decisions on the request, including the one just added.
    pub approvals: u32,
    /// Reject decisions on the request, including the one just added.
    pub rejections: u32,
    /// The status the request transitioned to, when it changed.
    pub new_status: Option<RequestStatus>,
}

/// The broker's durable store.
///
/// Wraps a single SQLite connection behind a mutex; every public operation
/// is atomic, and [`Store::create_review`] runs its re-tally and promotion
/// inside one transaction.
pub struct Store {
    conn: Mutex<Connection>,
}

// Fixed-width UTC timestamps so lexicographic order in SQL equals
// chronological order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn parse_ts_opt(s: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    s.map(|v| parse_ts(&v)).transpose()
}

impl Store {
    /// Open (and migrate) a file-backed store.
    ///
    /// Parent directories are created as needed; the database runs in WAL
    /// mode with foreign keys on.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] if the file cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Corrupt(format!("creating {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open an in-memory store (tests).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] if the schema cannot be applied.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Sessions -----------------------------------------------------------

    /// Persist a new session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] on conflict or I/O failure.
    pub fn create_session(&self, session: &Session) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, project_path, agent_name, program, model,
                                   created_at, last_active_at, hmac_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id,
                session.project_path,
                session.agent_name,
                session.program,
                session.model,
                ts(session.created_at),
                ts(session.last_active_at),
                session.hmac_key,
            ],
        )?;
        Ok(())
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, project_path, agent_name, program, model,
                        created_at, last_active_at, hmac_key
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, project_path, agent_name, program, model, created, active, hmac_key)) => {
                Ok(Some(Session {
                    id,
                    project_path,
                    agent_name,
                    program,
                    model,
                    created_at: parse_ts(&created)?,
                    last_active_at: parse_ts(&active)?,
                    hmac_key,
                }))
            }
        }
    }

    /// Update `last_active_at` for a session.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the session does not exist.
    pub fn touch_session(&self, id: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let changed = self.conn().execute(
            "UPDATE sessions SET last_active_at = ?1 WHERE id = ?2",
            params![ts(now), id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "session",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// All sessions registered for a project, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn list_sessions(&self, project: &str) -> StorageResult<Vec<Session>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_path, agent_name, program, model,
                    created_at, last_active_at, hmac_key
             FROM sessions WHERE project_path = ?1
             ORDER BY last_active_at DESC",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, project_path, agent_name, program, model, created, active, hmac_key) = row?;
            sessions.push(Session {
                id,
                project_path,
                agent_name,
                program,
                model,
                created_at: parse_ts(&created)?,
                last_active_at: parse_ts(&active)?,
                hmac_key,
            });
        }
        Ok(sessions)
    }

    /// Number of sessions registered for a project.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`].
    pub fn count_sessions(&self, project: &str) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sessions WHERE project_path = ?1",
            params![project],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // -- Requests -----------------------------------------------------------

    /// Persist a new request.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] on conflict,
    /// [`StorageError::Corrupt`] if the payload cannot be serialized.
    pub fn create_request(&self, request: &Request) -> StorageResult<()> {
        let argv_json = request
            .command
            .argv
            .as_ref()
            .map(|argv| serde_json::to_string(argv))
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("argv: {e}")))?;
        let justification = serde_json::to_string(&request.justification)
            .map_err(|e| StorageError::Corrupt(format!("justification: {e}")))?;
        let attachments = serde_json::to_string(&request.attachments)
            .map_err(|e| StorageError::Corrupt(format!("attachments: {e}")))?;

        self.conn().execute(
            "INSERT INTO requests (id, project_path, requestor_session_id, requestor_agent,
                                   requestor_model, command_raw, command_cwd, command_shell,
                                   command_argv, command_hash, risk_tier, justification,
                                   attachments, min_approvals, status, created_at,
                                   request_expires_at, approval_expires_at, rollback_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                request.id,
                request.project_path,
                request.requestor_session_id,
                request.requestor_agent,
                request.requestor_model,
                request.command.raw,
                request.command.cwd,
                request.command.shell,
                argv_json,
                request.command.hash,
                request.risk_tier.as_str(),
                justification,
                attachments,
                request.min_approvals,
                request.status.as_str(),
                ts(request.created_at),
                request.request_expires_at.map(ts),
                request.approval_expires_at.map(ts),
                request.rollback_path,
            ],
        )?;
        Ok(())
    }

    fn request_from_row(row: &Row<'_>) -> rusqlite::Result<RawRequestRow> {
        Ok(RawRequestRow {
            id: row.get(0)?,
            project_path: row.get(1)?,
            requestor_session_id: row.get(2)?,
            requestor_agent: row.get(3)?,
            requestor_model: row.get(4)?,
            command_raw: row.get(5)?,
            command_cwd: row.get(6)?,
            command_shell: row.get(7)?,
            command_argv: row.get(8)?,
            command_hash: row.get(9)?,
            risk_tier: row.get(10)?,
            justification: row.get(11)?,
            attachments: row.get(12)?,
            min_approvals: row.get(13)?,
            status: row.get(14)?,
            created_at: row.get(15)?,
            request_expires_at: row.get(16)?,
            approval_expires_at: row.get(17)?,
            rollback_path: row.get(18)?,
        })
    }

    const REQUEST_COLUMNS: &'static str =
        "id, project_path, requestor_session_id, requestor_agent, requestor_model,
         command_raw, command_cwd, command_shell, command_argv, command_hash,
         risk_tier, justification, attachments, min_approvals, status, created_at,
         request_expires_at, approval_expires_at, rollback_path";

    /// Fetch a request by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn get_request(&self, id: &str) -> StorageResult<Option<Request>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM requests WHERE id = ?1", Self::REQUEST_COLUMNS),
                params![id],
                Self::request_from_row,
            )
            .optional()?;
        row.map(RawRequestRow::into_request).transpose()
    }

    /// Fetch a request along with all its reviews, oldest review first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn get_request_with_reviews(
        &self,
        id: &str,
    ) -> StorageResult<Option<(Request, Vec<Review>)>> {
        let Some(request) = self.get_request(id)? else {
            return Ok(None);
        };
        let reviews = self.list_reviews(id)?;
        Ok(Some((request, reviews)))
    }

    /// All pending requests for a project, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn list_pending(&self, project: &str) -> StorageResult<Vec<Request>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM requests
             WHERE project_path = ?1 AND status = 'pending'
             ORDER BY created_at ASC",
            Self::REQUEST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![project], Self::request_from_row)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?.into_request()?);
        }
        Ok(requests)
    }

    /// Look up an identical pending request (dedup key: project + command
    /// hash + requestor session).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn find_pending_duplicate(
        &self,
        project: &str,
        command_hash: &str,
        session_id: &str,
    ) -> StorageResult<Option<Request>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM requests
                     WHERE project_path = ?1 AND command_hash = ?2
                       AND requestor_session_id = ?3 AND status = 'pending'
                     ORDER BY created_at DESC LIMIT 1",
                    Self::REQUEST_COLUMNS
                ),
                params![project, command_hash, session_id],
                Self::request_from_row,
            )
            .optional()?;
        row.map(RawRequestRow::into_request).transpose()
    }

    /// Pending requests currently held by a session (rate-limit input).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`].
    pub fn count_pending_for_session(&self, session_id: &str) -> StorageResult<u32> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM requests
             WHERE requestor_session_id = ?1 AND status = 'pending'",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Requests created by a session at or after `since` (sliding window).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`].
    pub fn count_requests_since(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<u32> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM requests
             WHERE requestor_session_id = ?1 AND created_at >= ?2",
            params![session_id, ts(since)],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Creation time of the oldest request inside the sliding window; the
    /// window resets sixty seconds after it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn earliest_request_since(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let earliest: Option<String> = self
            .conn()
            .query_row(
                "SELECT MIN(created_at) FROM requests
                 WHERE requestor_session_id = ?1 AND created_at >= ?2",
                params![session_id, ts(since)],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        parse_ts_opt(earliest)
    }

    /// Compare-and-swap status transition.
    ///
    /// The row moves to `new` only if its current status is one of
    /// `expected`; otherwise the actual status is reported so callers can
    /// tell a lost race from a missing row.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] when the request does not exist,
    /// [`StorageError::CasFailed`] when the predecessor check failed.
    pub fn update_request_status(
        &self,
        id: &str,
        new: RequestStatus,
        expected: &[RequestStatus],
    ) -> StorageResult<()> {
        let placeholders = expected
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE requests SET status = ? WHERE id = ? AND status IN ({placeholders})"
        );

        let conn = self.conn();
        let mut args: Vec<&str> = vec![new.as_str(), id];
        args.extend(expected.iter().map(|s| s.as_str()));
        let changed = conn.execute(&sql, rusqlite::params_from_iter(args))?;
        if changed > 0 {
            return Ok(());
        }

        let actual: Option<String> = conn
            .query_row(
                "SELECT status FROM requests WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match actual {
            None => Err(StorageError::NotFound {
                entity: "request",
                id: id.to_string(),
            }),
            Some(actual) => Err(StorageError::CasFailed {
                id: id.to_string(),
                actual,
            }),
        }
    }

    /// Record where a rollback capture landed for a request.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the request does not exist.
    pub fn set_request_rollback_path(&self, id: &str, path: &str) -> StorageResult<()> {
        let changed = self.conn().execute(
            "UPDATE requests SET rollback_path = ?1 WHERE id = ?2",
            params![path, id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "request",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // -- Reviews ------------------------------------------------------------

    /// Append a review and re-tally inside one transaction.
    ///
    /// The transaction re-reads the request (it must still be `pending`),
    /// rejects duplicate reviewers, inserts the review, recomputes the
    /// approve/reject tally, and asks `decide` whether the request
    /// transitions — all before commit, so a reject racing a quorum
    /// approval is settled by SQLite's serialization, and a reject visible
    /// at commit always wins.
    ///
    /// `decide` receives the re-read request and the tally (including the
    /// new review) and returns the transition to apply, if any, together
    /// with the approval expiry to set.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`], [`StorageError::RequestNotPending`],
    /// [`StorageError::DuplicateReview`], or the usual SQLite errors.
    pub fn create_review<F>(&self, review: &Review, decide: F) -> StorageResult<ReviewTally>
    where
        F: FnOnce(&Request, u32, u32) -> Option<(RequestStatus, Option<DateTime<Utc>>)>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let request = tx
            .query_row(
                &format!(
                    "SELECT {} FROM requests WHERE id = ?1",
                    Self::REQUEST_COLUMNS
                ),
                params![review.request_id],
                Self::request_from_row,
            )
            .optional()?
            .map(RawRequestRow::into_request)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound {
                entity: "request",
                id: review.request_id.clone(),
            })?;

        if request.status != RequestStatus::Pending {
            return Err(StorageError::RequestNotPending {
                id: request.id,
                status: request.status.as_str().to_string(),
            });
        }

        let duplicate: Option<String> = tx
            .query_row(
                "SELECT id FROM reviews
                 WHERE request_id = ?1 AND reviewer_session_id = ?2",
                params![review.request_id, review.reviewer_session_id],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(StorageError::DuplicateReview {
                request_id: review.request_id.clone(),
                reviewer: review.reviewer_session_id.clone(),
            });
        }

        tx.execute(
            "INSERT INTO reviews (id, request_id, reviewer_session_id, reviewer_agent,
                                  decision, comments, signature, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                review.id,
                review.request_id,
                review.reviewer_session_id,
                review.reviewer_agent,
                review.decision.as_str(),
                review.comments,
                review.signature,
                ts(review.created_at),
            ],
        )?;

        let approvals: i64 = tx.query_row(
            "SELECT COUNT(*) FROM reviews WHERE request_id = ?1 AND decision = 'approve'",
            params![review.request_id],
            |row| row.get(0),
        )?;
        let rejections: i64 = tx.query_row(
            "SELECT COUNT(*) FROM reviews WHERE request_id = ?1 AND decision = 'reject'",
            params![review.request_id],
            |row| row.get(0),
        )?;
        let approvals = u32::try_from(approvals).unwrap_or(u32::MAX);
        let rejections = u32::try_from(rejections).unwrap_or(u32::MAX);

        let new_status = decide(&request, approvals, rejections);
        if let Some((status, approval_expires_at)) = new_status {
            tx.execute(
                "UPDATE requests SET status = ?1, approval_expires_at = ?2 WHERE id = ?3",
                params![
                    status.as_str(),
                    approval_expires_at.map(ts),
                    review.request_id
                ],
            )?;
        }

        tx.commit()?;
        Ok(ReviewTally {
            approvals,
            rejections,
            new_status: new_status.map(|(s, _)| s),
        })
    }

    /// All reviews on a request, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn list_reviews(&self, request_id: &str) -> StorageResult<Vec<Review>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, request_id, reviewer_session_id, reviewer_agent,
                    decision, comments, signature, created_at
             FROM reviews WHERE request_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![request_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut reviews = Vec::new();
        for row in rows {
            let (id, request_id, reviewer_session_id, reviewer_agent, decision, comments, signature, created) =
                row?;
            reviews.push(Review {
                id,
                request_id,
                reviewer_session_id,
                reviewer_agent,
                decision: decision
                    .parse()
                    .map_err(|e| StorageError::Corrupt(format!("decision: {e}")))?,
                comments,
                signature,
                created_at: parse_ts(&created)?,
            });
        }
        Ok(reviews)
    }

    // -- Executions ---------------------------------------------------------

    /// Record an execution. At most one row per request, ever.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ExecutionExists`] when the request already
    /// has an execution row.
    pub fn create_execution(&self, execution: &Execution) -> StorageResult<()> {
        let result = self.conn().execute(
            "INSERT INTO executions (id, request_id, started_at, finished_at,
                                     exit_code, duration_ms, log_path, rollback_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                execution.id,
                execution.request_id,
                ts(execution.started_at),
                execution.finished_at.map(ts),
                execution.exit_code,
                execution.duration_ms,
                execution.log_path,
                execution.rollback_path,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::ExecutionExists {
                    request_id: execution.request_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the execution row for a request, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] or [`StorageError::Corrupt`].
    pub fn get_execution(&self, request_id: &str) -> StorageResult<Option<Execution>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, request_id, started_at, finished_at, exit_code,
                        duration_ms, log_path, rollback_path
                 FROM executions WHERE request_id = ?1",
                params![request_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i32>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, request_id, started, finished, exit_code, duration_ms, log_path, rollback)) => {
                Ok(Some(Execution {
                    id,
                    request_id,
                    started_at: parse_ts(&started)?,
                    finished_at: parse_ts_opt(finished)?,
                    exit_code,
                    duration_ms,
                    log_path,
                    rollback_path: rollback,
                }))
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// Intermediate row shape; split out so rusqlite's error type stays inside
/// the row-mapping closure and domain parsing happens afterwards.
struct RawRequestRow {
    id: String,
    project_path: String,
    requestor_session_id: String,
    requestor_agent: String,
    requestor_model: String,
    command_raw: String,
    command_cwd: String,
    command_shell: bool,
    command_argv: Option<String>,
    command_hash: String,
    risk_tier: String,
    justification: String,
    attachments: String,
    min_approvals: u32,
    status: String,
    created_at: String,
    request_expires_at: Option<String>,
    approval_expires_at: Option<String>,
    rollback_path: Option<String>,
}

impl RawRequestRow {
    fn into_request(self) -> StorageResult<Request> {
        let argv: Option<Vec<String>> = self
            .command_argv
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("argv: {e}")))?;
        let justification: Justification = serde_json::from_str(&self.justification)
            .map_err(|e| StorageError::Corrupt(format!("justification: {e}")))?;
        let attachments: Vec<Attachment> = serde_json::from_str(&self.attachments)
            .map_err(|e| StorageError::Corrupt(format!("attachments: {e}")))?;

        Ok(Request {
            id: self.id,
            project_path: self.project_path,
            requestor_session_id: self.requestor_session_id,
            requestor_agent: self.requestor_agent,
            requestor_model: self.requestor_model,
            command: CommandSpec {
                raw: self.command_raw,
                cwd: self.command_cwd,
                shell: self.command_shell,
                argv,
                hash: self.command_hash,
            },
            risk_tier: self
                .risk_tier
                .parse()
                .map_err(|e| StorageError::Corrupt(format!("risk_tier: {e}")))?,
            justification,
            attachments,
            min_approvals: self.min_approvals,
            status: self
                .status
                .parse()
                .map_err(|e| StorageError::Corrupt(format!("status: {e}")))?,
            created_at: parse_ts(&self.created_at)?,
            request_expires_at: parse_ts_opt(self.request_expires_at)?,
            approval_expires_at: parse_ts_opt(self.approval_expires_at)?,
            rollback_path: self.rollback_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_core::{ReviewDecision, RiskTier};

    fn make_session(store: &Store, project: &str, agent: &str) -> Session {
        let session = Session::new(project, agent, "test-program", "test-model");
        store.create_session(&session).unwrap();
        session
    }

    fn make_request(store: &Store, session: &Session, raw: &str) -> Request {
        let mut request = Request::new(
            &session.project_path,
            &session.id,
            &session.agent_name,
            CommandSpec::shell(raw, "/tmp"),
            RiskTier::Dangerous,
        );
        request.command.hash = format!("hash-of-{raw}");
        store.create_request(&request).unwrap();
        request
    }

    #[test]
    fn test_session_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.agent_name, "agent-a");
        assert_eq!(loaded.hmac_key, session.hmac_key);
        assert!(store.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_touch_session() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        let later = session.last_active_at + chrono::Duration::seconds(90);

        store.touch_session(&session.id, later).unwrap();
        let loaded = store.get_session(&session.id).unwrap().unwrap();
        // stored at microsecond precision
        assert_eq!(
            loaded.last_active_at.timestamp_micros(),
            later.timestamp_micros()
        );

        assert!(matches!(
            store.touch_session("missing", later),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_and_count_sessions() {
        let store = Store::open_in_memory().unwrap();
        make_session(&store, "/proj", "agent-a");
        make_session(&store, "/proj", "agent-b");
        make_session(&store, "/other", "agent-c");

        assert_eq!(store.list_sessions("/proj").unwrap().len(), 2);
        assert_eq!(store.count_sessions("/proj").unwrap(), 2);
        assert_eq!(store.count_sessions("/other").unwrap(), 1);
    }

    #[test]
    fn test_request_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        let mut request = Request::new(
            "/proj",
            &session.id,
            "agent-a",
            CommandSpec::exec(
                "rm -rf build",
                "/proj",
                vec!["rm".into(), "-rf".into(), "build".into()],
            ),
            RiskTier::Critical,
        );
        request.min_approvals = 2;
        request.justification.reason = "cleanup".into();
        store.create_request(&request).unwrap();

        let loaded = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(loaded.risk_tier, RiskTier::Critical);
        assert_eq!(loaded.min_approvals, 2);
        assert_eq!(loaded.command.argv.as_deref().unwrap().len(), 3);
        assert_eq!(loaded.justification.reason, "cleanup");
        assert!(!loaded.command.shell);
    }

    #[test]
    fn test_pending_queries() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        let r1 = make_request(&store, &session, "rm -rf a");
        make_request(&store, &session, "rm -rf b");

        assert_eq!(store.list_pending("/proj").unwrap().len(), 2);
        assert_eq!(store.count_pending_for_session(&session.id).unwrap(), 2);

        store
            .update_request_status(&r1.id, RequestStatus::Cancelled, &[RequestStatus::Pending])
            .unwrap();
        assert_eq!(store.count_pending_for_session(&session.id).unwrap(), 1);
    }

    #[test]
    fn test_find_pending_duplicate() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        let request = make_request(&store, &session, "rm -rf a");

        let dup = store
            .find_pending_duplicate("/proj", &request.command.hash, &session.id)
            .unwrap();
        assert_eq!(dup.unwrap().id, request.id);

        let none = store
            .find_pending_duplicate("/proj", "other-hash", &session.id)
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_window_counts() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        make_request(&store, &session, "rm -rf a");
        make_request(&store, &session, "rm -rf b");

        let long_ago = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(store.count_requests_since(&session.id, long_ago).unwrap(), 2);
        let future = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(store.count_requests_since(&session.id, future).unwrap(), 0);

        let earliest = store
            .earliest_request_since(&session.id, long_ago)
            .unwrap()
            .unwrap();
        assert!(earliest <= Utc::now());
    }

    #[test]
    fn test_cas_transition() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        let request = make_request(&store, &session, "rm -rf a");

        store
            .update_request_status(&request.id, RequestStatus::Approved, &[RequestStatus::Pending])
            .unwrap();

        // Second CAS with the stale predecessor loses.
        let err = store
            .update_request_status(&request.id, RequestStatus::Approved, &[RequestStatus::Pending])
            .unwrap_err();
        assert!(matches!(err, StorageError::CasFailed { ref actual, .. } if actual == "approved"));

        let err = store
            .update_request_status("missing", RequestStatus::Approved, &[RequestStatus::Pending])
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_create_review_promotes_on_quorum() {
        let store = Store::open_in_memory().unwrap();
        let requestor = make_session(&store, "/proj", "agent-a");
        let reviewer = make_session(&store, "/proj", "agent-b");
        let request = make_request(&store, &requestor, "rm -rf a");

        let review = Review::new(&request.id, &reviewer.id, "agent-b", ReviewDecision::Approve, "");
        let expiry = Utc::now() + chrono::Duration::minutes(30);
        let tally = store
            .create_review(&review, |req, approvals, _rejections| {
                (approvals >= req.min_approvals)
                    .then_some((RequestStatus::Approved, Some(expiry)))
            })
            .unwrap();

        assert_eq!(tally.approvals, 1);
        assert_eq!(tally.rejections, 0);
        assert_eq!(tally.new_status, Some(RequestStatus::Approved));

        let loaded = store.get_request(&request.id).unwrap().unwrap();
        assert_eq!(loaded.status, RequestStatus::Approved);
        assert_eq!(
            loaded.approval_expires_at.unwrap().timestamp_micros(),
            expiry.timestamp_micros()
        );
    }

    #[test]
    fn test_create_review_duplicate_reviewer() {
        let store = Store::open_in_memory().unwrap();
        let requestor = make_session(&store, "/proj", "agent-a");
        let reviewer = make_session(&store, "/proj", "agent-b");
        let request = make_request(&store, &requestor, "rm -rf a");

        let first = Review::new(&request.id, &reviewer.id, "agent-b", ReviewDecision::Approve, "");
        store.create_review(&first, |_, _, _| None).unwrap();

        let second = Review::new(&request.id, &reviewer.id, "agent-b", ReviewDecision::Reject, "");
        let err = store.create_review(&second, |_, _, _| None).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateReview { .. }));

        // The duplicate insert must not have leaked into the table.
        assert_eq!(store.list_reviews(&request.id).unwrap().len(), 1);
    }

    #[test]
    fn test_create_review_closed_request() {
        let store = Store::open_in_memory().unwrap();
        let requestor = make_session(&store, "/proj", "agent-a");
        let reviewer = make_session(&store, "/proj", "agent-b");
        let request = make_request(&store, &requestor, "rm -rf a");
        store
            .update_request_status(&request.id, RequestStatus::Rejected, &[RequestStatus::Pending])
            .unwrap();

        let review = Review::new(&request.id, &reviewer.id, "agent-b", ReviewDecision::Approve, "");
        let err = store.create_review(&review, |_, _, _| None).unwrap_err();
        assert!(matches!(err, StorageError::RequestNotPending { .. }));
    }

    #[test]
    fn test_execution_single_fire() {
        let store = Store::open_in_memory().unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        let request = make_request(&store, &session, "rm -rf a");

        let execution = Execution::begin(&request.id, "/proj/.vouch/logs/x.log");
        store.create_execution(&execution).unwrap();

        let again = Execution::begin(&request.id, "/proj/.vouch/logs/y.log");
        let err = store.create_execution(&again).unwrap_err();
        assert!(matches!(err, StorageError::ExecutionExists { .. }));

        let loaded = store.get_execution(&request.id).unwrap().unwrap();
        assert_eq!(loaded.id, execution.id);
    }

    #[test]
    fn test_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(".vouch").join("state.db");
        let store = Store::open(&db_path).unwrap();
        let session = make_session(&store, "/proj", "agent-a");
        drop(store);

        let reopened = Store::open(&db_path).unwrap();
        assert!(reopened.get_session(&session.id).unwrap().is_some());
    }
}
