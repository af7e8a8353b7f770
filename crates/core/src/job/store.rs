//! Job storage trait and types.

use std::fmt;
use std::path::PathBuf;

use crate::engine::EngineKind;
use crate::job::{Job, JobSpec};

/// Error type for job store operations.
#[derive(Debug)]
pub enum JobError {
    /// Job not found.
    NotFound(String),
    /// Transition not allowed from the current status.
    InvalidTransition {
        job_id: String,
        current_status: String,
        requested: String,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound(id) => write!(f, "Job not found: {}", id),
            JobError::InvalidTransition {
                job_id,
                current_status,
                requested,
            } => write!(
                f,
                "Cannot apply {} to job {}: current status is {}",
                requested, job_id, current_status
            ),
            JobError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// A state change applied to a job.
///
/// The store validates every transition against the status state machine;
/// illegal transitions surface as [`JobError::InvalidTransition`] so a
/// terminal job can never change state again.
#[derive(Debug, Clone)]
pub enum JobTransition {
    /// A worker claimed the job (Pending -> Running).
    Started,
    /// An attempt failed; the job stays Running. Records which engine was
    /// tried, bumps `attempt_count` and sets `last_error`.
    AttemptFailed { engine: EngineKind, error: String },
    /// Download finished (Running -> Completed).
    Completed {
        engine: EngineKind,
        output_path: PathBuf,
    },
    /// Retries exhausted or permanent failure (Running -> Failed).
    Failed { error: String },
    /// Cancelled by the caller (Pending|Running -> Cancelled).
    Cancelled,
}

impl JobTransition {
    /// Short name for error messages and logging.
    pub fn name(&self) -> &'static str {
        match self {
            JobTransition::Started => "started",
            JobTransition::AttemptFailed { .. } => "attempt_failed",
            JobTransition::Completed { .. } => "completed",
            JobTransition::Failed { .. } => "failed",
            JobTransition::Cancelled => "cancelled",
        }
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by status (as_str form).
    pub status: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
pub trait JobStore: Send + Sync {
    /// Create a new Pending job from a spec.
    fn create(&self, spec: JobSpec) -> Result<Job, JobError>;

    /// Get a job by ID.
    fn get(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// List jobs matching the filter, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// Apply a validated state transition and return the updated job.
    fn transition(&self, id: &str, transition: JobTransition) -> Result<Job, JobError>;
}
