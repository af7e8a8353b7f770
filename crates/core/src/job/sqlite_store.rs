//! SQLite-backed job store implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::engine::EngineKind;
use crate::job::{Job, JobError, JobFilter, JobSpec, JobStatus, JobStore, JobTransition};

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables
    /// if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                spec TEXT NOT NULL,
                status TEXT NOT NULL,
                engine_used TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                output_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let id: String = row.get(0)?;
        let spec_json: String = row.get(1)?;
        let status_str: String = row.get(2)?;
        let engine_str: Option<String> = row.get(3)?;
        let attempt_count: u32 = row.get(4)?;
        let last_error: Option<String> = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;
        let completed_at_str: Option<String> = row.get(8)?;
        let output_path: Option<String> = row.get(9)?;

        let spec: JobSpec =
            serde_json::from_str(&spec_json).unwrap_or_else(|_| JobSpec::new(""));

        let status = Self::parse_status(&status_str);
        let engine_used = engine_str.as_deref().and_then(EngineKind::parse);

        let created_at = Self::parse_timestamp(&created_at_str);
        let updated_at = Self::parse_timestamp(&updated_at_str);
        let completed_at = completed_at_str.as_deref().map(Self::parse_timestamp);

        Ok(Job {
            id,
            spec,
            status,
            engine_used,
            attempt_count,
            last_error,
            created_at,
            updated_at,
            completed_at,
            output_path: output_path.map(PathBuf::from),
        })
    }

    fn parse_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<Job>, JobError> {
        let result = conn.query_row(
            "SELECT id, spec, status, engine_used, attempt_count, last_error, created_at, updated_at, completed_at, output_path FROM jobs WHERE id = ?",
            params![id],
            Self::row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(JobError::Database(e.to_string())),
        }
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, spec: JobSpec) -> Result<Job, JobError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let spec_json =
            serde_json::to_string(&spec).map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, spec, status, attempt_count, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
            params![
                id,
                spec_json,
                JobStatus::Pending.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(Job {
            id,
            spec,
            status: JobStatus::Pending,
            engine_used: None,
            attempt_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            output_path: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        let conn = self.conn.lock().unwrap();

        let limit = if filter.limit > 0 { filter.limit } else { 100 };

        let mut jobs = Vec::new();
        if let Some(ref status) = filter.status {
            let mut stmt = conn
                .prepare(
                    "SELECT id, spec, status, engine_used, attempt_count, last_error, created_at, updated_at, completed_at, output_path FROM jobs WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .map_err(|e| JobError::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![status, limit, filter.offset], Self::row_to_job)
                .map_err(|e| JobError::Database(e.to_string()))?;
            for row in rows {
                jobs.push(row.map_err(|e| JobError::Database(e.to_string()))?);
            }
        } else {
            let mut stmt = conn
                .prepare(
                    "SELECT id, spec, status, engine_used, attempt_count, last_error, created_at, updated_at, completed_at, output_path FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .map_err(|e| JobError::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![limit, filter.offset], Self::row_to_job)
                .map_err(|e| JobError::Database(e.to_string()))?;
            for row in rows {
                jobs.push(row.map_err(|e| JobError::Database(e.to_string()))?);
            }
        }

        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.conn.lock().unwrap();

        let result = if let Some(ref status) = filter.status {
            conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?",
                params![status],
                |row| row.get(0),
            )
        } else {
            conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))
        };

        result.map_err(|e| JobError::Database(e.to_string()))
    }

    fn transition(&self, id: &str, transition: JobTransition) -> Result<Job, JobError> {
        let conn = self.conn.lock().unwrap();

        let job = Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let target = match &transition {
            JobTransition::Started => JobStatus::Running,
            JobTransition::AttemptFailed { .. } => JobStatus::Running,
            JobTransition::Completed { .. } => JobStatus::Completed,
            JobTransition::Failed { .. } => JobStatus::Failed,
            JobTransition::Cancelled => JobStatus::Cancelled,
        };

        if !job.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                current_status: job.status.as_str().to_string(),
                requested: transition.name().to_string(),
            });
        }

        let now = Utc::now();

        match &transition {
            JobTransition::Started => {
                conn.execute(
                    "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?",
                    params![target.as_str(), now.to_rfc3339(), id],
                )
            }
            JobTransition::AttemptFailed { engine, error } => {
                conn.execute(
                    "UPDATE jobs SET status = ?, engine_used = ?, attempt_count = attempt_count + 1, last_error = ?, updated_at = ? WHERE id = ?",
                    params![target.as_str(), engine.as_str(), error, now.to_rfc3339(), id],
                )
            }
            JobTransition::Completed {
                engine,
                output_path,
            } => {
                // The successful attempt counts too: attempt_count is the
                // total number of attempts made, not just the failed ones.
                conn.execute(
                    "UPDATE jobs SET status = ?, engine_used = ?, output_path = ?, completed_at = ?, updated_at = ?, attempt_count = attempt_count + 1 WHERE id = ?",
                    params![
                        target.as_str(),
                        engine.as_str(),
                        output_path.to_string_lossy(),
                        now.to_rfc3339(),
                        now.to_rfc3339(),
                        id
                    ],
                )
            }
            JobTransition::Failed { error } => {
                conn.execute(
                    "UPDATE jobs SET status = ?, last_error = ?, updated_at = ? WHERE id = ?",
                    params![target.as_str(), error, now.to_rfc3339(), id],
                )
            }
            JobTransition::Cancelled => {
                conn.execute(
                    "UPDATE jobs SET status = ?, updated_at = ? WHERE id = ?",
                    params![target.as_str(), now.to_rfc3339(), id],
                )
            }
        }
        .map_err(|e| JobError::Database(e.to_string()))?;

        Self::get_locked(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}
