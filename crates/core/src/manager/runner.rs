//! Download manager implementation.
//!
//! Owns the job queue and a fixed-size worker pool. Each worker pulls one
//! job at a time and drives its attempt loop to a terminal state: engine
//! selection, auth context lookup, the engine call under a wall-clock
//! timeout, and the retry/switch/give-up decisions from the classifier.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::cleanup::StorageCleaner;
use crate::engine::{
    select_engine, CancelFlag, EngineFailure, EngineFailureKind, EngineKind, EngineResult,
    MediaEngine,
};
use crate::job::{Job, JobError, JobFilter, JobSpec, JobStatus, JobStore, JobTransition};
use crate::notify::{JobNotification, Notifier};
use crate::retry::{classify, RetryDecision};
use crate::token::TokenLifecycle;

use super::config::ManagerConfig;
use super::types::{ManagerError, ManagerStatus};

/// How many AuthRejected failures on the primary engine force a switch to
/// the secondary, regardless of the retry ceiling.
const PRIMARY_AUTH_REJECTIONS_BEFORE_SWITCH: u32 = 2;

/// Granularity of cancellable sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// The download manager: the only component that mutates jobs.
pub struct DownloadManager {
    config: ManagerConfig,
    store: Arc<dyn JobStore>,
    primary: Arc<dyn MediaEngine>,
    secondary: Arc<dyn MediaEngine>,
    tokens: Arc<TokenLifecycle>,
    notifier: Arc<dyn Notifier>,
    cleaner: Option<Arc<StorageCleaner>>,

    // Runtime state
    running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    queue: Arc<Mutex<VecDeque<String>>>,
    queue_notify: Arc<Notify>,
    cancel_flags: Arc<RwLock<HashMap<String, CancelFlag>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DownloadManager {
    /// Create a new manager. Engines, token lifecycle and sinks are
    /// injected; the manager owns nothing it talks to except the queue.
    pub fn new(
        config: ManagerConfig,
        store: Arc<dyn JobStore>,
        primary: Arc<dyn MediaEngine>,
        secondary: Arc<dyn MediaEngine>,
        tokens: Arc<TokenLifecycle>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            store,
            primary,
            secondary,
            tokens,
            notifier,
            cleaner: None,
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            queue_notify: Arc::new(Notify::new()),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Attach a storage cleaner to be triggered after each completion.
    pub fn with_cleaner(mut self, cleaner: Arc<StorageCleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    // ========================================================================
    // Public contract
    // ========================================================================

    /// Validate and enqueue a download request; returns the new job id
    /// immediately.
    pub async fn submit(&self, spec: JobSpec) -> Result<String, ManagerError> {
        Self::validate_spec(&spec)?;

        let job = self.store.create(spec)?;
        debug!(job_id = %job.id, url = %job.spec.source_url, "Job submitted");

        self.cancel_flags
            .write()
            .await
            .insert(job.id.clone(), CancelFlag::new());
        self.queue.lock().await.push_back(job.id.clone());
        self.queue_notify.notify_one();

        Ok(job.id)
    }

    /// Snapshot of the current job state.
    pub fn query(&self, id: &str) -> Result<Job, ManagerError> {
        self.store
            .get(id)?
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))
    }

    /// List job snapshots matching the filter.
    pub fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, ManagerError> {
        Ok(self.store.list(filter)?)
    }

    /// Count jobs matching the filter.
    pub fn count(&self, filter: &JobFilter) -> Result<i64, ManagerError> {
        Ok(self.store.count(filter)?)
    }

    /// Cancel a job. Pending jobs leave the queue and go terminal at once;
    /// running jobs are signalled and go terminal when the worker observes
    /// the signal. Cancelling a terminal job is a no-op, not an error.
    pub async fn cancel(&self, id: &str) -> Result<(), ManagerError> {
        let job = self
            .store
            .get(id)?
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Ok(());
        }

        // Signal first so a worker that wins the claim race still sees it.
        if let Some(flag) = self.cancel_flags.read().await.get(id) {
            flag.cancel();
        }

        if job.status == JobStatus::Pending {
            self.queue.lock().await.retain(|queued| queued.as_str() != id);
            match self.store.transition(id, JobTransition::Cancelled) {
                Ok(_) => {
                    info!(job_id = id, "Pending job cancelled");
                    self.cancel_flags.write().await.remove(id);
                }
                // A worker claimed it in between; the flag handles it.
                Err(JobError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            info!(job_id = id, "Cancellation signalled to running job");
        }

        Ok(())
    }

    /// Current manager status.
    pub async fn status(&self) -> ManagerStatus {
        ManagerStatus {
            running: self.running.load(Ordering::Relaxed),
            workers: self.config.max_concurrent,
            queued: self.queue.lock().await.len(),
            active: self.active.load(Ordering::Relaxed),
        }
    }

    /// Start the worker pool (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Download manager already running");
            return;
        }

        info!(workers = self.config.max_concurrent, "Starting download manager");

        self.recover_interrupted_jobs().await;

        for worker_id in 0..self.config.max_concurrent.max(1) {
            self.spawn_worker(worker_id);
        }

        info!("Download manager started");
    }

    /// Stop the worker pool gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Download manager not running");
            return;
        }

        info!("Stopping download manager");
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to finish their current checkpoint.
        tokio::time::sleep(Duration::from_millis(200)).await;

        info!("Download manager stopped");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn validate_spec(spec: &JobSpec) -> Result<(), ManagerError> {
        if spec.source_url.trim().is_empty() {
            return Err(ManagerError::InvalidRequest(
                "source_url is empty".to_string(),
            ));
        }
        let parsed = url::Url::parse(&spec.source_url)
            .map_err(|e| ManagerError::InvalidRequest(format!("source_url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ManagerError::InvalidRequest(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }
        Ok(())
    }

    /// Put jobs from a previous process life back in order: queued jobs are
    /// re-enqueued, jobs that died mid-run are failed.
    async fn recover_interrupted_jobs(&self) {
        match self
            .store
            .list(&JobFilter::new().with_status("running").with_limit(1000))
        {
            Ok(jobs) => {
                for job in jobs {
                    warn!(job_id = %job.id, "Failing job interrupted by restart");
                    let _ = self.store.transition(
                        &job.id,
                        JobTransition::Failed {
                            error: "interrupted by service restart".to_string(),
                        },
                    );
                }
            }
            Err(e) => warn!(error = %e, "Failed to scan for interrupted jobs"),
        }

        match self
            .store
            .list(&JobFilter::new().with_status("pending").with_limit(1000))
        {
            Ok(mut jobs) => {
                if jobs.is_empty() {
                    return;
                }
                // list() returns newest first; the queue wants FIFO.
                jobs.sort_by_key(|j| j.created_at);
                let mut queue = self.queue.lock().await;
                let mut flags = self.cancel_flags.write().await;
                for job in jobs {
                    if !queue.contains(&job.id) {
                        flags.entry(job.id.clone()).or_default();
                        queue.push_back(job.id.clone());
                    }
                }
                info!(count = queue.len(), "Re-enqueued pending jobs");
            }
            Err(e) => warn!(error = %e, "Failed to scan for pending jobs"),
        }
    }

    fn spawn_worker(&self, worker_id: usize) {
        let worker = Worker {
            id: worker_id,
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            primary: Arc::clone(&self.primary),
            secondary: Arc::clone(&self.secondary),
            tokens: Arc::clone(&self.tokens),
            notifier: Arc::clone(&self.notifier),
            cleaner: self.cleaner.clone(),
            running: Arc::clone(&self.running),
            active: Arc::clone(&self.active),
            queue: Arc::clone(&self.queue),
            queue_notify: Arc::clone(&self.queue_notify),
            cancel_flags: Arc::clone(&self.cancel_flags),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(worker.run(shutdown_rx));
    }
}

/// One worker of the pool; processes jobs to a terminal state, one at a
/// time.
struct Worker {
    id: usize,
    config: ManagerConfig,
    store: Arc<dyn JobStore>,
    primary: Arc<dyn MediaEngine>,
    secondary: Arc<dyn MediaEngine>,
    tokens: Arc<TokenLifecycle>,
    notifier: Arc<dyn Notifier>,
    cleaner: Option<Arc<StorageCleaner>>,
    running: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    queue: Arc<Mutex<VecDeque<String>>>,
    queue_notify: Arc<Notify>,
    cancel_flags: Arc<RwLock<HashMap<String, CancelFlag>>>,
}

impl Worker {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!(worker = self.id, "Worker started");
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let next = self.queue.lock().await.pop_front();
            match next {
                Some(job_id) => {
                    self.active.fetch_add(1, Ordering::SeqCst);
                    self.process(&job_id).await;
                    self.active.fetch_sub(1, Ordering::SeqCst);
                }
                None => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = self.queue_notify.notified() => {}
                    }
                }
            }
        }
        debug!(worker = self.id, "Worker stopped");
    }

    fn engine(&self, kind: EngineKind) -> &dyn MediaEngine {
        match kind {
            EngineKind::Primary => self.primary.as_ref(),
            EngineKind::Secondary => self.secondary.as_ref(),
        }
    }

    async fn process(&self, job_id: &str) {
        // Claim: Pending -> Running. A cancel that won the race left the
        // job terminal and the claim fails; that is not an error.
        let job = match self.store.transition(job_id, JobTransition::Started) {
            Ok(job) => job,
            Err(JobError::InvalidTransition { .. }) => {
                debug!(job_id, worker = self.id, "Job no longer claimable, skipping");
                self.cancel_flags.write().await.remove(job_id);
                return;
            }
            Err(e) => {
                warn!(job_id, error = %e, "Failed to claim job");
                return;
            }
        };

        let cancel = self
            .cancel_flags
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default();

        info!(job_id, worker = self.id, url = %job.spec.source_url, "Job started");
        self.run_attempts(&job, &cancel).await;
        self.cancel_flags.write().await.remove(job_id);
    }

    /// The attempt loop: one iteration per engine attempt until a terminal
    /// state is reached.
    async fn run_attempts(&self, job: &Job, cancel: &CancelFlag) {
        let spec = &job.spec;
        let backoff_cfg = self.config.backoff();

        let mut engine_kind = select_engine(spec, self.primary.as_ref(), self.secondary.as_ref());
        let mut attempts_on_engine: u32 = 0;
        let mut total_attempts: u32 = 0;
        let mut switched = false;
        let mut primary_auth_rejections: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                self.finish_cancelled(&job.id).await;
                return;
            }

            let engine = self.engine(engine_kind);
            let auth = self.tokens.get_valid(engine.name()).await;

            let outcome = tokio::time::timeout(
                Duration::from_secs(self.config.attempt_timeout_secs),
                engine.extract(&job.id, spec, &auth, cancel),
            )
            .await;

            let failure = match outcome {
                Ok(Ok(result)) => {
                    self.finish_completed(job, engine_kind, result).await;
                    return;
                }
                Ok(Err(failure)) => failure,
                // The engine future was dropped at the deadline; the same
                // retry policy as any other network-class failure applies.
                Err(_) => EngineFailure::network(format!(
                    "attempt timed out after {}s",
                    self.config.attempt_timeout_secs
                )),
            };

            if cancel.is_cancelled() {
                self.finish_cancelled(&job.id).await;
                return;
            }

            attempts_on_engine += 1;
            total_attempts += 1;
            warn!(
                job_id = %job.id,
                engine = engine.name(),
                attempt = total_attempts,
                error = %failure,
                "Attempt failed"
            );
            if let Err(e) = self.store.transition(
                &job.id,
                JobTransition::AttemptFailed {
                    engine: engine_kind,
                    error: failure.to_string(),
                },
            ) {
                warn!(job_id = %job.id, error = %e, "Failed to record attempt");
            }

            if failure.kind == EngineFailureKind::AuthRejected {
                // Never let the next attempt reuse a token we know is dead.
                self.tokens.invalidate(engine.name()).await;

                if engine_kind == EngineKind::Primary && !switched {
                    primary_auth_rejections += 1;
                    if primary_auth_rejections >= PRIMARY_AUTH_REJECTIONS_BEFORE_SWITCH {
                        info!(
                            job_id = %job.id,
                            "Primary engine rejected auth twice, switching to secondary"
                        );
                        engine_kind = EngineKind::Secondary;
                        switched = true;
                        attempts_on_engine = 0;
                        continue;
                    }
                }
            }

            let decision = classify(
                failure.kind,
                attempts_on_engine,
                self.config.retry_ceiling,
                engine_kind,
                &backoff_cfg,
            );

            match decision {
                RetryDecision::RetrySameEngine { backoff } => {
                    debug!(
                        job_id = %job.id,
                        backoff_ms = backoff.as_millis() as u64,
                        "Retrying on same engine"
                    );
                    if self.cancellable_sleep(backoff, cancel).await {
                        self.finish_cancelled(&job.id).await;
                        return;
                    }
                }
                RetryDecision::SwitchEngine => {
                    if switched {
                        // One switch per job; the alternate also ran dry.
                        self.finish_failed(&job.id, &failure, total_attempts).await;
                        return;
                    }
                    info!(
                        job_id = %job.id,
                        from = engine_kind.as_str(),
                        to = engine_kind.other().as_str(),
                        "Switching engine"
                    );
                    switched = true;
                    engine_kind = engine_kind.other();
                    attempts_on_engine = 0;
                }
                RetryDecision::GiveUp => {
                    self.finish_failed(&job.id, &failure, total_attempts).await;
                    return;
                }
            }
        }
    }

    async fn finish_completed(&self, job: &Job, engine: EngineKind, result: EngineResult) {
        info!(
            job_id = %job.id,
            engine = engine.as_str(),
            output = %result.output_path.display(),
            "Job completed"
        );

        match self.store.transition(
            &job.id,
            JobTransition::Completed {
                engine,
                output_path: result.output_path.clone(),
            },
        ) {
            Ok(updated) => {
                self.send_notification(JobNotification {
                    job_id: updated.id.clone(),
                    status: JobStatus::Completed,
                    output_path: updated.output_path.clone(),
                    error: None,
                });
            }
            Err(e) => warn!(job_id = %job.id, error = %e, "Failed to mark job completed"),
        }

        // Synchronous quota check: completion is the moment disk usage grew.
        if let Some(ref cleaner) = self.cleaner {
            if let Err(e) = cleaner.enforce_quota() {
                warn!(error = %e, "Post-completion eviction pass failed");
            }
        }
    }

    async fn finish_failed(&self, job_id: &str, failure: &EngineFailure, total_attempts: u32) {
        let summary = format!(
            "{} after {} attempt(s): {}",
            failure.kind.as_str(),
            total_attempts,
            failure.detail
        );
        info!(job_id, error = %summary, "Job failed permanently");

        match self
            .store
            .transition(job_id, JobTransition::Failed { error: summary.clone() })
        {
            Ok(updated) => {
                self.send_notification(JobNotification {
                    job_id: updated.id.clone(),
                    status: JobStatus::Failed,
                    output_path: None,
                    error: updated.last_error.clone(),
                });
            }
            Err(e) => warn!(job_id, error = %e, "Failed to mark job failed"),
        }
    }

    async fn finish_cancelled(&self, job_id: &str) {
        info!(job_id, "Job cancelled");
        if let Err(e) = self.store.transition(job_id, JobTransition::Cancelled) {
            // Cancel may have already landed via the pending-path race.
            debug!(job_id, error = %e, "Cancel transition not applied");
        }
    }

    /// Fire-and-forget: a slow or broken sink never holds up a worker.
    fn send_notification(&self, notification: JobNotification) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify(notification).await;
        });
    }

    /// Sleep in slices, returning true if cancellation arrived mid-sleep.
    async fn cancellable_sleep(&self, duration: Duration, cancel: &CancelFlag) -> bool {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if cancel.is_cancelled() {
                return true;
            }
            let step = remaining.min(SLEEP_SLICE);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        cancel.is_cancelled()
    }
}
