//! Download manager configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the download manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Size of the worker pool; at most this many jobs run at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-engine retry ceiling consulted by the failure classifier.
    /// A job switches engines at most once, so total attempts are bounded
    /// by twice this value.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Wall-clock timeout for a single engine attempt (seconds). An
    /// exceeded timeout is treated as a network-class failure.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Base backoff delay between retries (milliseconds).
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Maximum backoff delay (milliseconds).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

fn default_max_concurrent() -> usize {
    2
}

fn default_retry_ceiling() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_backoff_base() -> u64 {
    2000
}

fn default_backoff_max() -> u64 {
    120_000
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retry_ceiling: default_retry_ceiling(),
            attempt_timeout_secs: default_attempt_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl ManagerConfig {
    /// Backoff tunables derived from this config.
    pub fn backoff(&self) -> crate::retry::BackoffConfig {
        crate::retry::BackoffConfig {
            base: std::time::Duration::from_millis(self.backoff_base_ms),
            max: std::time::Duration::from_millis(self.backoff_max_ms),
            ..Default::default()
        }
    }
}
