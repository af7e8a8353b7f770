//! Notification sink for terminal job outcomes.
//!
//! Fire-and-forget: the download manager spawns the notification off the
//! worker path and a failing sink never affects job state.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::job::JobStatus;

/// A terminal job outcome pushed to the sink.
#[derive(Debug, Clone)]
pub struct JobNotification {
    pub job_id: String,
    pub status: JobStatus,
    /// Set for completed jobs.
    pub output_path: Option<PathBuf>,
    /// Set for failed jobs.
    pub error: Option<String>,
}

/// Trait for notification sinks (chat push, webhooks, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Errors are the implementation's problem;
    /// callers neither retry nor propagate them.
    async fn notify(&self, notification: JobNotification);
}

/// Default sink: structured log lines only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: JobNotification) {
        match notification.status {
            JobStatus::Completed => info!(
                job_id = %notification.job_id,
                output = ?notification.output_path,
                "Job completed"
            ),
            JobStatus::Failed => info!(
                job_id = %notification.job_id,
                error = notification.error.as_deref().unwrap_or("unknown"),
                "Job failed"
            ),
            _ => info!(
                job_id = %notification.job_id,
                status = notification.status.as_str(),
                "Job finished"
            ),
        }
    }
}
