//! Types for storage eviction.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors from an eviction pass. Per-file problems are not errors; they
/// land in the report's skipped list.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Cannot read output directory {0}: {1}")]
    OutputDirUnreadable(PathBuf, String),

    #[error("Job store error: {0}")]
    Store(String),
}

/// Retention and quota policy over the output directory.
///
/// Injected explicitly; the cleaner holds the policy it was built with and
/// never reads configuration from anywhere else.
#[derive(Debug, Clone)]
pub struct StoragePolicy {
    /// Evict oldest files once the directory total exceeds this.
    pub max_total_bytes: u64,
    /// Files older than this are evicted regardless of quota headroom.
    pub max_file_age: Duration,
    /// The newest N files are never evicted for space. Age-based eviction
    /// overrides this protection.
    pub min_recent_files_kept: usize,
    /// Interval of the periodic enforcement task.
    pub check_interval: Duration,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            max_total_bytes: 10 * 1024 * 1024 * 1024,
            max_file_age: Duration::from_secs(7 * 24 * 3600),
            min_recent_files_kept: 3,
            check_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Why a file was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Older than `max_file_age`.
    Age,
    /// Removed to get the directory back under `max_total_bytes`.
    Quota,
}

/// A file removed during an eviction pass.
#[derive(Debug, Clone, Serialize)]
pub struct EvictedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub reason: EvictionReason,
}

/// A file the pass looked at but left alone for a stated reason.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EvictionReport {
    pub files_scanned: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub bytes_freed: u64,
    pub evicted: Vec<EvictedFile>,
    pub skipped: Vec<SkippedFile>,
}
