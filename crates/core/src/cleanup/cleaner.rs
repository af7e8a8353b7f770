//! Storage eviction pass implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::job::{JobFilter, JobStore};

use super::types::{
    CleanupError, EvictedFile, EvictionReason, EvictionReport, SkippedFile, StoragePolicy,
};

/// One file the scanner found in the output directory.
#[derive(Debug, Clone)]
struct ScannedFile {
    path: PathBuf,
    size_bytes: u64,
    modified: SystemTime,
}

/// Enforces the storage policy over the output directory.
///
/// Two passes per run: first age (files past `max_file_age` go, and age
/// overrides the keep-newest protection), then quota (oldest-first down to
/// `max_total_bytes`, never touching the `min_recent_files_kept` newest).
/// Files belonging to jobs that are not yet terminal are never removed.
pub struct StorageCleaner {
    policy: StoragePolicy,
    output_dir: PathBuf,
    store: Arc<dyn JobStore>,
}

impl StorageCleaner {
    pub fn new(policy: StoragePolicy, output_dir: PathBuf, store: Arc<dyn JobStore>) -> Self {
        Self {
            policy,
            output_dir,
            store,
        }
    }

    /// The policy this cleaner enforces.
    pub fn policy(&self) -> &StoragePolicy {
        &self.policy
    }

    /// Run one full enforcement pass and report what happened.
    pub fn enforce_quota(&self) -> Result<EvictionReport, CleanupError> {
        let mut report = EvictionReport::default();

        let active_ids = self.active_job_ids()?;
        let mut files = self.scan(&mut report)?;

        report.files_scanned = files.len();
        report.bytes_before = files.iter().map(|f| f.size_bytes).sum();

        let now = SystemTime::now();

        // Pass 1: age. Overrides recency protection.
        let mut kept = Vec::with_capacity(files.len());
        for file in files.drain(..) {
            let too_old = now
                .duration_since(file.modified)
                .map(|age| age > self.policy.max_file_age)
                .unwrap_or(false);

            if !too_old {
                kept.push(file);
                continue;
            }
            if self.is_protected(&file.path, &active_ids) {
                report.skipped.push(SkippedFile {
                    path: file.path,
                    reason: "job not terminal".to_string(),
                });
                continue;
            }
            self.remove(file, EvictionReason::Age, &mut report);
        }
        files = kept;

        // Pass 2: quota, oldest first, newest N untouchable.
        files.sort_by_key(|f| f.modified);
        let mut total: u64 = files.iter().map(|f| f.size_bytes).sum();

        if total > self.policy.max_total_bytes {
            let evictable = files.len().saturating_sub(self.policy.min_recent_files_kept);
            let mut removed = 0usize;
            for file in files.into_iter() {
                if total <= self.policy.max_total_bytes || removed >= evictable {
                    break;
                }
                if self.is_protected(&file.path, &active_ids) {
                    report.skipped.push(SkippedFile {
                        path: file.path,
                        reason: "job not terminal".to_string(),
                    });
                    continue;
                }
                let size = file.size_bytes;
                if self.remove(file, EvictionReason::Quota, &mut report) {
                    total -= size;
                    removed += 1;
                }
            }
        }

        report.bytes_after = report.bytes_before - report.bytes_freed;

        if !report.evicted.is_empty() {
            info!(
                evicted = report.evicted.len(),
                bytes_freed = report.bytes_freed,
                "Eviction pass complete"
            );
        } else {
            debug!(files = report.files_scanned, "Eviction pass found nothing to do");
        }

        Ok(report)
    }

    /// Spawn the periodic enforcement task. Runs until the shutdown channel
    /// fires.
    pub fn spawn_periodic(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let interval = self.policy.check_interval;
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Storage cleaner started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Storage cleaner received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.enforce_quota() {
                            warn!(error = %e, "Periodic eviction pass failed");
                        }
                    }
                }
            }
            info!("Storage cleaner stopped");
        })
    }

    /// Ids of jobs whose files must not be touched.
    fn active_job_ids(&self) -> Result<Vec<String>, CleanupError> {
        let mut ids = Vec::new();
        for status in ["pending", "running"] {
            let jobs = self
                .store
                .list(&JobFilter::new().with_status(status).with_limit(1000))
                .map_err(|e| CleanupError::Store(e.to_string()))?;
            ids.extend(jobs.into_iter().map(|j| j.id));
        }
        Ok(ids)
    }

    /// Output files are named `<job_id>.<ext>`, so a prefix match against
    /// active ids identifies files still owned by a live job. In-flight
    /// `.part` files are protected unconditionally.
    fn is_protected(&self, path: &Path, active_ids: &[String]) -> bool {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => return true,
        };
        if name.ends_with(".part") {
            return true;
        }
        active_ids.iter().any(|id| name.starts_with(id.as_str()))
    }

    fn scan(&self, report: &mut EvictionReport) -> Result<Vec<ScannedFile>, CleanupError> {
        let entries = std::fs::read_dir(&self.output_dir).map_err(|e| {
            CleanupError::OutputDirUnreadable(self.output_dir.clone(), e.to_string())
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Unreadable directory entry during scan");
                    continue;
                }
            };
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    report.skipped.push(SkippedFile {
                        path,
                        reason: format!("stat failed: {}", e),
                    });
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(ScannedFile {
                path,
                size_bytes: metadata.len(),
                modified,
            });
        }
        Ok(files)
    }

    /// Delete one file. IO failures are logged, recorded as skipped and
    /// retried implicitly on the next pass.
    fn remove(
        &self,
        file: ScannedFile,
        reason: EvictionReason,
        report: &mut EvictionReport,
    ) -> bool {
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                debug!(path = %file.path.display(), ?reason, "Evicted file");
                report.bytes_freed += file.size_bytes;
                report.evicted.push(EvictedFile {
                    path: file.path,
                    size_bytes: file.size_bytes,
                    reason,
                });
                true
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Failed to evict file");
                report.skipped.push(SkippedFile {
                    path: file.path,
                    reason: format!("remove failed: {}", e),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::job::{JobSpec, JobTransition, SqliteJobStore};

    fn write_file(dir: &Path, name: &str, size: usize, age: Duration) {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; size]).unwrap();
        let mtime = SystemTime::now() - age;
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    fn cleaner(policy: StoragePolicy, dir: &TempDir) -> (StorageCleaner, Arc<SqliteJobStore>) {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        (
            StorageCleaner::new(policy, dir.path().to_path_buf(), store.clone()),
            store,
        )
    }

    #[test]
    fn test_under_quota_evicts_nothing() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.mp4", 100, Duration::from_secs(60));
        write_file(dir.path(), "b.mp4", 100, Duration::from_secs(120));

        let policy = StoragePolicy {
            max_total_bytes: 1000,
            max_file_age: Duration::from_secs(3600),
            min_recent_files_kept: 1,
            check_interval: Duration::from_secs(60),
        };
        let (cleaner, _store) = cleaner(policy, &dir);
        let report = cleaner.enforce_quota().unwrap();

        assert_eq!(report.files_scanned, 2);
        assert!(report.evicted.is_empty());
        assert_eq!(report.bytes_before, 200);
        assert_eq!(report.bytes_after, 200);
    }

    #[test]
    fn test_quota_evicts_oldest_first_down_to_limit() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "oldest.mp4", 400, Duration::from_secs(300));
        write_file(dir.path(), "middle.mp4", 400, Duration::from_secs(200));
        write_file(dir.path(), "newest.mp4", 400, Duration::from_secs(100));

        let policy = StoragePolicy {
            max_total_bytes: 800,
            max_file_age: Duration::from_secs(3600),
            min_recent_files_kept: 1,
            check_interval: Duration::from_secs(60),
        };
        let (cleaner, _store) = cleaner(policy, &dir);
        let report = cleaner.enforce_quota().unwrap();

        assert_eq!(report.evicted.len(), 1);
        assert!(report.evicted[0].path.ends_with("oldest.mp4"));
        assert_eq!(report.evicted[0].reason, EvictionReason::Quota);
        assert_eq!(report.bytes_after, 800);
        assert!(dir.path().join("newest.mp4").exists());
        assert!(dir.path().join("middle.mp4").exists());
    }

    #[test]
    fn test_recency_protection_limits_quota_eviction() {
        let dir = TempDir::new().unwrap();
        for (i, age) in [500u64, 400, 300, 200].iter().enumerate() {
            write_file(
                dir.path(),
                &format!("f{}.mp4", i),
                500,
                Duration::from_secs(*age),
            );
        }

        // Quota would demand removing all four, but three are protected.
        let policy = StoragePolicy {
            max_total_bytes: 100,
            max_file_age: Duration::from_secs(3600),
            min_recent_files_kept: 3,
            check_interval: Duration::from_secs(60),
        };
        let (cleaner, _store) = cleaner(policy, &dir);
        let report = cleaner.enforce_quota().unwrap();

        // count - min_recent = 1 file evictable for space.
        assert_eq!(report.evicted.len(), 1);
        assert!(report.evicted[0].path.ends_with("f0.mp4"));
    }

    #[test]
    fn test_age_overrides_recency_protection() {
        let dir = TempDir::new().unwrap();
        // All files are among the "newest 5" yet both old ones must go.
        write_file(dir.path(), "ancient.mp4", 100, Duration::from_secs(7200));
        write_file(dir.path(), "old.mp4", 100, Duration::from_secs(5400));
        write_file(dir.path(), "fresh.mp4", 100, Duration::from_secs(60));

        let policy = StoragePolicy {
            max_total_bytes: u64::MAX,
            max_file_age: Duration::from_secs(3600),
            min_recent_files_kept: 5,
            check_interval: Duration::from_secs(60),
        };
        let (cleaner, _store) = cleaner(policy, &dir);
        let report = cleaner.enforce_quota().unwrap();

        assert_eq!(report.evicted.len(), 2);
        assert!(report.evicted.iter().all(|e| e.reason == EvictionReason::Age));
        assert!(dir.path().join("fresh.mp4").exists());
        assert!(!dir.path().join("ancient.mp4").exists());
    }

    #[test]
    fn test_active_job_files_are_never_removed() {
        let dir = TempDir::new().unwrap();
        let policy = StoragePolicy {
            max_total_bytes: 100,
            max_file_age: Duration::from_secs(1),
            min_recent_files_kept: 0,
            check_interval: Duration::from_secs(60),
        };
        let (cleaner, store) = cleaner(policy, &dir);

        // A running job owns one of the files.
        let job = store.create(JobSpec::new("https://example.com/v/1")).unwrap();
        store.transition(&job.id, JobTransition::Started).unwrap();

        write_file(
            dir.path(),
            &format!("{}.mp4", job.id),
            500,
            Duration::from_secs(600),
        );
        write_file(dir.path(), "orphan.mp4", 500, Duration::from_secs(600));

        let report = cleaner.enforce_quota().unwrap();

        assert!(dir.path().join(format!("{}.mp4", job.id)).exists());
        assert!(!dir.path().join("orphan.mp4").exists());
        assert!(report
            .skipped
            .iter()
            .any(|s| s.reason.contains("not terminal")));
    }

    #[test]
    fn test_part_files_are_protected() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "x.mp4.part", 500, Duration::from_secs(600));

        let policy = StoragePolicy {
            max_total_bytes: 100,
            max_file_age: Duration::from_secs(1),
            min_recent_files_kept: 0,
            check_interval: Duration::from_secs(60),
        };
        let (cleaner, _store) = cleaner(policy, &dir);
        cleaner.enforce_quota().unwrap();

        assert!(dir.path().join("x.mp4.part").exists());
    }
}
