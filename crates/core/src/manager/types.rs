//! Types for the download manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the manager's public contract.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The submitted spec is malformed; not retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No job with that id.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Job store error.
    #[error("job store error: {0}")]
    Store(#[from] crate::job::JobError),
}

/// Current status of the download manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// Whether the worker pool is running.
    pub running: bool,
    /// Size of the worker pool.
    pub workers: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Jobs currently being executed.
    pub active: usize,
}
