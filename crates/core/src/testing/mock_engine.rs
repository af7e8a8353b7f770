//! Mock download engine for testing.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::engine::{
    CancelFlag, EngineFailure, EngineFailureKind, EngineKind, EngineResult, MediaEngine,
};
use crate::job::JobSpec;
use crate::token::AuthContext;

/// A recorded extract call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExtract {
    pub job_id: String,
    pub source_url: String,
    pub auth: AuthContext,
}

/// Mock implementation of the MediaEngine trait.
///
/// Provides controllable behavior for testing:
/// - Queue outcomes (failures or successes) consumed one per call
/// - Track extract calls for assertions
/// - Simulate slow engines and observe cancellation
///
/// With an output directory set, successful extractions write a real file
/// named `<job_id>.mp4` so round-trip tests can check the filesystem.
pub struct MockEngine {
    kind: EngineKind,
    supports: AtomicBool,
    delay: RwLock<Duration>,
    outcomes: Mutex<VecDeque<Result<(), EngineFailureKind>>>,
    calls: Arc<RwLock<Vec<RecordedExtract>>>,
    output_dir: RwLock<Option<PathBuf>>,
}

impl MockEngine {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            supports: AtomicBool::new(true),
            delay: RwLock::new(Duration::ZERO),
            outcomes: Mutex::new(VecDeque::new()),
            calls: Arc::new(RwLock::new(Vec::new())),
            output_dir: RwLock::new(None),
        }
    }

    /// A mock filling the primary slot.
    pub fn primary() -> Self {
        Self::new(EngineKind::Primary)
    }

    /// A mock filling the secondary slot.
    pub fn secondary() -> Self {
        Self::new(EngineKind::Secondary)
    }

    /// Set whether `supports` claims specs.
    pub fn with_supports(self, supports: bool) -> Self {
        self.supports.store(supports, Ordering::SeqCst);
        self
    }

    /// Flip `supports` on an already-shared mock.
    pub fn set_supports(&self, supports: bool) {
        self.supports.store(supports, Ordering::SeqCst);
    }

    /// Make every extract call take this long (cancellable sleep).
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Write real output files into this directory on success.
    pub async fn set_output_dir(&self, dir: PathBuf) {
        *self.output_dir.write().await = Some(dir);
    }

    /// Queue a failure for the next call. Once the queue is empty, calls
    /// succeed.
    pub async fn push_failure(&self, kind: EngineFailureKind) {
        self.outcomes.lock().await.push_back(Err(kind));
    }

    /// Queue an explicit success.
    pub async fn push_success(&self) {
        self.outcomes.lock().await.push_back(Ok(()));
    }

    /// All recorded extract calls.
    pub async fn calls(&self) -> Vec<RecordedExtract> {
        self.calls.read().await.clone()
    }

    /// Number of extract calls made.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &str {
        match self.kind {
            EngineKind::Primary => "mock-primary",
            EngineKind::Secondary => "mock-secondary",
        }
    }

    fn supports(&self, _spec: &JobSpec) -> bool {
        self.supports.load(Ordering::SeqCst)
    }

    async fn extract(
        &self,
        job_id: &str,
        spec: &JobSpec,
        auth: &AuthContext,
        cancel: &CancelFlag,
    ) -> Result<EngineResult, EngineFailure> {
        self.calls.write().await.push(RecordedExtract {
            job_id: job_id.to_string(),
            source_url: spec.source_url.clone(),
            auth: auth.clone(),
        });

        // Cancellable sleep in small slices, like a real engine's
        // checkpoint cadence.
        let delay = *self.delay.read().await;
        let mut remaining = delay;
        let slice = Duration::from_millis(10);
        while remaining > Duration::ZERO {
            if cancel.is_cancelled() {
                return Err(EngineFailure::unknown("cancelled by caller"));
            }
            let step = remaining.min(slice);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        if cancel.is_cancelled() {
            return Err(EngineFailure::unknown("cancelled by caller"));
        }

        let outcome = self.outcomes.lock().await.pop_front().unwrap_or(Ok(()));
        match outcome {
            Ok(()) => {
                let dir = self.output_dir.read().await.clone();
                let output_path = match dir {
                    Some(dir) => {
                        let path = dir.join(format!("{}.mp4", job_id));
                        let _ = std::fs::write(&path, b"mock media");
                        path
                    }
                    None => PathBuf::from(format!("/mock/{}.mp4", job_id)),
                };
                Ok(EngineResult {
                    output_path,
                    duration_secs: Some(12.5),
                    final_format: "mp4".to_string(),
                })
            }
            Err(kind) => Err(EngineFailure::new(kind, "scripted failure")),
        }
    }
}
