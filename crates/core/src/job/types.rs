//! Core job data types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineKind;

/// Requested media quality for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Best available quality.
    #[default]
    Best,
    /// Up to 1080p.
    P1080,
    /// Up to 720p.
    P720,
    /// Smallest available.
    Worst,
}

impl Quality {
    /// Returns the quality as a format-selector keyword.
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::Worst => "worst",
        }
    }
}

/// Container/codec format for the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mkv,
    Webm,
    Mp3,
    M4a,
    Opus,
}

impl OutputFormat {
    /// File extension for this format (no leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Webm => "webm",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "m4a",
            OutputFormat::Opus => "opus",
        }
    }

    /// True for audio-only container formats.
    pub fn is_audio(&self) -> bool {
        matches!(self, OutputFormat::Mp3 | OutputFormat::M4a | OutputFormat::Opus)
    }
}

/// What to download and how. Immutable once submitted; engines receive this
/// read-only and never touch the Job record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Source media URL.
    pub source_url: String,
    /// Requested quality.
    #[serde(default)]
    pub requested_quality: Quality,
    /// Extract audio only.
    #[serde(default)]
    pub audio_only: bool,
    /// Output container format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl JobSpec {
    /// Create a spec with defaults for everything but the URL.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            requested_quality: Quality::Best,
            audio_only: false,
            output_format: OutputFormat::Mp4,
        }
    }

    /// Set the requested quality.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.requested_quality = quality;
        self
    }

    /// Set audio-only extraction.
    pub fn with_audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    /// Set the output format.
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }
}

/// Current status of a job.
///
/// State machine flow:
/// ```text
/// Pending -> Running -> Completed
///    |          |
///    |          +-----> Failed
///    |          |
///    +----------+-----> Cancelled
/// ```
/// `Completed`, `Failed` and `Cancelled` are terminal; no further
/// transitions are allowed once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for a worker.
    Pending,
    /// A worker is executing the attempt loop.
    Running,
    /// Download finished, output file on disk.
    Completed,
    /// All attempts exhausted or a permanent failure.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl JobStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Cancelled) => true,
            // Recording a failed attempt keeps the job Running.
            (JobStatus::Running, JobStatus::Running) => true,
            _ => false,
        }
    }

    /// Returns the status as a string (for filtering and API responses).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// A single download request tracked through its lifecycle.
///
/// Owned exclusively by the download manager via the job store; everything
/// handed to other components is a snapshot copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier (UUID).
    pub id: String,
    /// What to download.
    pub spec: JobSpec,
    /// Current status.
    pub status: JobStatus,
    /// Engine that handled (or last attempted) the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_used: Option<EngineKind>,
    /// Total attempts made across all engines.
    #[serde(default)]
    pub attempt_count: u32,
    /// Error from the most recent failed attempt, or the terminal failure
    /// summary once `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// When the job reached `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Path of the downloaded file; set if and only if `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Job {
    /// Returns true if the job can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_spec_builder() {
        let spec = JobSpec::new("https://example.com/v/1")
            .with_quality(Quality::P720)
            .with_audio_only(true)
            .with_output_format(OutputFormat::M4a);
        assert_eq!(spec.requested_quality, Quality::P720);
        assert!(spec.audio_only);
        assert_eq!(spec.output_format, OutputFormat::M4a);
    }

    #[test]
    fn test_spec_defaults_on_deserialize() {
        let spec: JobSpec =
            serde_json::from_str(r#"{"source_url":"https://example.com/v/1"}"#).unwrap();
        assert_eq!(spec.requested_quality, Quality::Best);
        assert!(!spec.audio_only);
        assert_eq!(spec.output_format, OutputFormat::Mp4);
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::Mp4.extension(), "mp4");
        assert_eq!(OutputFormat::Opus.extension(), "opus");
        assert!(OutputFormat::Mp3.is_audio());
        assert!(!OutputFormat::Mkv.is_audio());
    }
}
