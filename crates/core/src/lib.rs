pub mod cleanup;
pub mod config;
pub mod engine;
pub mod job;
pub mod manager;
pub mod notify;
pub mod retry;
pub mod testing;
pub mod token;

pub use cleanup::{
    CleanupError, EvictedFile, EvictionReason, EvictionReport, SkippedFile, StorageCleaner,
    StoragePolicy,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{
    select_engine, CancelFlag, DirectHttpEngine, EngineFailure, EngineFailureKind, EngineKind,
    EngineResult, MediaEngine, ProxyHandle, YtDlpEngine,
};
pub use job::{
    Job, JobError, JobFilter, JobSpec, JobStatus, JobStore, JobTransition, OutputFormat, Quality,
    SqliteJobStore,
};
pub use manager::{DownloadManager, ManagerConfig, ManagerError, ManagerStatus};
pub use notify::{JobNotification, LogNotifier, Notifier};
pub use retry::{backoff_delay, classify, BackoffConfig, RetryDecision};
pub use token::{
    AuthContext, CommandTokenGenerator, SqliteTokenStore, TokenGenerator, TokenLifecycle,
    TokenLifecycleConfig, TokenProbe, TokenStore,
};
