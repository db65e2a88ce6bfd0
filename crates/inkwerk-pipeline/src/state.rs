// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent job state store backed by SQLite.
//
// All mutation goes through a single transactional `update` primitive that
// loads the record, applies a state-transition closure, and stores the
// result — so concurrent progress writes cannot lose updates. Writes
// against a record that no longer exists are silent no-ops: an abandoned
// job must not crash the run that is still rendering it.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

use inkwerk_core::error::{InkwerkError, Result};
use inkwerk_core::types::{JobId, JobStatus, RenderJob};

/// SQLite schema for the jobs table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS render_jobs (
        id            TEXT PRIMARY KEY,
        filename      TEXT NOT NULL,
        status        TEXT NOT NULL,
        num_pages     INTEGER NOT NULL DEFAULT 0,
        progress      INTEGER NOT NULL DEFAULT 0,
        current_stage TEXT NOT NULL DEFAULT '',
        upload_path   TEXT,
        result_path   TEXT,
        error_message TEXT,
        warnings      TEXT NOT NULL DEFAULT '[]',
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL,
        completed_at  TEXT
    )
"#;

/// Convert a `rusqlite::Error` into an `InkwerkError::Database`.
fn db_err(e: rusqlite::Error) -> InkwerkError {
    InkwerkError::Database(e.to_string())
}

/// Persistent job store backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively. In an async context, calls are short enough to run inline;
/// the orchestrator serialises access behind a mutex.
pub struct JobStore {
    conn: Connection,
}

impl JobStore {
    /// Open (or create) the job database at the given path, enabling WAL
    /// mode for concurrent readers.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("job store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory job store opened");
        Ok(Self { conn })
    }

    /// Insert a new job record.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn create_job(&self, job: &RenderJob) -> Result<()> {
        let status_json = serde_json::to_string(&job.status)?;
        let warnings_json = serde_json::to_string(&job.warnings)?;

        self.conn
            .execute(
                "INSERT INTO render_jobs (id, filename, status, num_pages, progress,
                 current_stage, upload_path, result_path, error_message, warnings,
                 created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    job.id.to_string(),
                    job.filename,
                    status_json,
                    job.num_pages,
                    job.progress,
                    job.current_stage,
                    job.upload_path,
                    job.result_path,
                    job.error_message,
                    warnings_json,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    job.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(db_err)?;

        info!(job_id = %job.id, "job created");
        Ok(())
    }

    /// Retrieve a single job by its ID. Returns `None` if it does not exist.
    pub fn get_job(&self, job_id: &JobId) -> Result<Option<RenderJob>> {
        Self::select_job(&self.conn, job_id)
    }

    /// Apply a state-transition closure to a job inside one transaction.
    ///
    /// Loads the record, runs the closure, bumps `updated_at`, and stores
    /// the result. Two deliberate quiet paths:
    /// - a missing record is a no-op (the job may have been deleted mid-run);
    /// - a record already in a terminal state is left untouched.
    #[instrument(skip(self, f), fields(job_id = %job_id))]
    pub fn update<F>(&self, job_id: &JobId, f: F) -> Result<()>
    where
        F: FnOnce(&mut RenderJob),
    {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;

        let Some(mut job) = Self::select_job(&tx, job_id)? else {
            debug!(job_id = %job_id, "update on missing job ignored");
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(job_id = %job_id, status = ?job.status, "update on terminal job ignored");
            return Ok(());
        }

        f(&mut job);
        job.updated_at = Utc::now();
        Self::store_job(&tx, &job)?;

        tx.commit().map_err(db_err)?;
        Ok(())
    }

    /// Guarded Uploaded → Processing transition.
    ///
    /// Refuses — without mutating anything — when the job is already
    /// Processing or has reached a terminal state, making duplicate start
    /// requests harmless.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn try_begin_processing(&self, job_id: &JobId) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;

        let Some(mut job) = Self::select_job(&tx, job_id)? else {
            return Err(InkwerkError::JobNotFound(job_id.to_string()));
        };
        if job.status != JobStatus::Uploaded {
            debug!(job_id = %job_id, status = ?job.status, "processing start refused");
            return Err(InkwerkError::NotStartable(job.status));
        }

        job.status = JobStatus::Processing;
        job.current_stage = "Starting...".into();
        job.updated_at = Utc::now();
        Self::store_job(&tx, &job)?;

        tx.commit().map_err(db_err)?;
        info!(job_id = %job_id, "job processing started");
        Ok(())
    }

    /// Delete a job record. Idempotent — deleting a missing job succeeds.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn delete_job(&self, job_id: &JobId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM render_jobs WHERE id = ?1",
                params![job_id.to_string()],
            )
            .map_err(db_err)?;

        info!(job_id = %job_id, "job deleted");
        Ok(())
    }

    // -- Row plumbing ---------------------------------------------------------

    fn select_job(conn: &Connection, job_id: &JobId) -> Result<Option<RenderJob>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, filename, status, num_pages, progress, current_stage,
                        upload_path, result_path, error_message, warnings,
                        created_at, updated_at, completed_at
                 FROM render_jobs WHERE id = ?1",
            )
            .map_err(db_err)?;

        let mut rows = stmt
            .query_map(params![job_id.to_string()], row_to_render_job)
            .map_err(db_err)?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(db_err(e)),
            None => Ok(None),
        }
    }

    fn store_job(conn: &Connection, job: &RenderJob) -> Result<()> {
        let status_json = serde_json::to_string(&job.status)?;
        let warnings_json = serde_json::to_string(&job.warnings)?;

        conn.execute(
            "UPDATE render_jobs SET filename = ?2, status = ?3, num_pages = ?4,
             progress = ?5, current_stage = ?6, upload_path = ?7, result_path = ?8,
             error_message = ?9, warnings = ?10, updated_at = ?11, completed_at = ?12
             WHERE id = ?1",
            params![
                job.id.to_string(),
                job.filename,
                status_json,
                job.num_pages,
                job.progress,
                job.current_stage,
                job.upload_path,
                job.result_path,
                job.error_message,
                warnings_json,
                job.updated_at.to_rfc3339(),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

/// Map a SQLite row to a `RenderJob`.
///
/// Column indices must match the SELECT order used in `select_job`.
fn row_to_render_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<RenderJob> {
    let id_str: String = row.get(0)?;
    let filename: String = row.get(1)?;
    let status_json: String = row.get(2)?;
    let num_pages: u32 = row.get::<_, i64>(3)? as u32;
    let progress: u32 = row.get::<_, i64>(4)? as u32;
    let current_stage: String = row.get(5)?;
    let upload_path: Option<String> = row.get(6)?;
    let result_path: Option<String> = row.get(7)?;
    let error_message: Option<String> = row.get(8)?;
    let warnings_json: String = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;
    let completed_at_str: Option<String> = row.get(12)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status: JobStatus = serde_json::from_str(&status_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let warnings: Vec<String> = serde_json::from_str(&warnings_json).unwrap_or_default();

    let parse_time = |s: &str, col: usize| -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    col,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };

    let created_at = parse_time(&created_at_str, 10)?;
    let updated_at = parse_time(&updated_at_str, 11)?;
    let completed_at = match completed_at_str {
        Some(s) => Some(parse_time(&s, 12)?),
        None => None,
    };

    Ok(RenderJob {
        id: JobId(uuid),
        filename,
        status,
        num_pages,
        progress,
        current_stage,
        upload_path,
        result_path,
        error_message,
        warnings,
        created_at,
        updated_at,
        completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> RenderJob {
        RenderJob::new("lecture-notes.pdf".into())
    }

    #[test]
    fn create_and_retrieve_job() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");

        let retrieved = store.get_job(&job.id).expect("get_job").expect("found");
        assert_eq!(retrieved.id, job.id);
        assert_eq!(retrieved.filename, "lecture-notes.pdf");
        assert_eq!(retrieved.status, JobStatus::Uploaded);
    }

    #[test]
    fn get_nonexistent_job_returns_none() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        assert!(store.get_job(&JobId::new()).expect("get_job").is_none());
    }

    #[test]
    fn update_applies_closure() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");

        store
            .update(&job.id, |j| {
                j.num_pages = 7;
                j.warnings.push("diagram not stylized".into());
            })
            .expect("update");

        let updated = store.get_job(&job.id).expect("get").expect("found");
        assert_eq!(updated.num_pages, 7);
        assert_eq!(updated.warnings, vec!["diagram not stylized".to_string()]);
        assert!(updated.updated_at >= job.updated_at);
    }

    #[test]
    fn update_on_missing_job_is_a_noop() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        // Progress writes after the record has been deleted must not error.
        store
            .update(&JobId::new(), |j| j.progress = 50)
            .expect("update must be a silent no-op");
    }

    #[test]
    fn update_on_deleted_job_is_a_noop() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");
        store.delete_job(&job.id).expect("delete");

        store
            .update(&job.id, |j| j.progress = 99)
            .expect("update after delete must be a no-op");
        assert!(store.get_job(&job.id).expect("get").is_none());
    }

    #[test]
    fn begin_processing_from_uploaded() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");

        store.try_begin_processing(&job.id).expect("begin");
        let started = store.get_job(&job.id).expect("get").expect("found");
        assert_eq!(started.status, JobStatus::Processing);
    }

    #[test]
    fn duplicate_begin_is_refused_without_mutation() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");
        store.try_begin_processing(&job.id).expect("first begin");

        store
            .update(&job.id, |j| {
                j.progress = 42;
                j.current_stage = "Rendering paper...".into();
            })
            .expect("progress");

        let err = store.try_begin_processing(&job.id).expect_err("must refuse");
        assert!(matches!(err, InkwerkError::NotStartable(JobStatus::Processing)));

        // Nothing moved.
        let job_after = store.get_job(&job.id).expect("get").expect("found");
        assert_eq!(job_after.progress, 42);
        assert_eq!(job_after.current_stage, "Rendering paper...");
    }

    #[test]
    fn begin_is_refused_from_terminal_states() {
        let store = JobStore::open_in_memory().expect("open in-memory db");

        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            let job = test_job();
            store.create_job(&job).expect("create");
            store.try_begin_processing(&job.id).expect("begin");
            store
                .update(&job.id, |j| j.status = terminal)
                .expect("finish");

            let err = store.try_begin_processing(&job.id).expect_err("must refuse");
            assert!(matches!(err, InkwerkError::NotStartable(s) if s == terminal));
        }
    }

    #[test]
    fn begin_on_missing_job_is_an_error() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let err = store.try_begin_processing(&JobId::new()).expect_err("err");
        assert!(matches!(err, InkwerkError::JobNotFound(_)));
    }

    #[test]
    fn terminal_jobs_are_immutable() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");
        store.try_begin_processing(&job.id).expect("begin");
        store
            .update(&job.id, |j| {
                j.status = JobStatus::Completed;
                j.progress = 100;
            })
            .expect("complete");

        // A straggler progress write changes nothing.
        store
            .update(&job.id, |j| {
                j.progress = 10;
                j.current_stage = "should not stick".into();
            })
            .expect("noop");

        let after = store.get_job(&job.id).expect("get").expect("found");
        assert_eq!(after.progress, 100);
        assert_ne!(after.current_stage, "should not stick");
    }

    #[test]
    fn delete_job_is_idempotent() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.create_job(&job).expect("create");

        store.delete_job(&job.id).expect("delete first time");
        store.delete_job(&job.id).expect("delete second time (idempotent)");
    }
}
