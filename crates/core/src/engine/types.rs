//! Types for download engine operations.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobSpec;
use crate::token::AuthContext;

/// Which of the two engines a job was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Broad-coverage extractor engine (yt-dlp).
    Primary,
    /// Lightweight direct-download engine.
    Secondary,
}

impl EngineKind {
    /// Returns the kind as a string (for persistence and API responses).
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Primary => "primary",
            EngineKind::Secondary => "secondary",
        }
    }

    /// Parse from the as_str form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(EngineKind::Primary),
            "secondary" => Some(EngineKind::Secondary),
            _ => None,
        }
    }

    /// The other engine.
    pub fn other(&self) -> Self {
        match self {
            EngineKind::Primary => EngineKind::Secondary,
            EngineKind::Secondary => EngineKind::Primary,
        }
    }
}

/// Classified failure kinds an engine attempt can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFailureKind {
    /// Connection problems, timeouts, DNS, truncated transfers.
    NetworkError,
    /// The source throttled or rejected us for request volume.
    RateLimited,
    /// The source rejected our authentication material.
    AuthRejected,
    /// The requested quality/format does not exist at the source.
    FormatUnavailable,
    /// Anything that could not be classified.
    Unknown,
}

impl EngineFailureKind {
    /// Returns the kind as a short label for errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFailureKind::NetworkError => "network_error",
            EngineFailureKind::RateLimited => "rate_limited",
            EngineFailureKind::AuthRejected => "auth_rejected",
            EngineFailureKind::FormatUnavailable => "format_unavailable",
            EngineFailureKind::Unknown => "unknown",
        }
    }
}

/// A failed engine attempt: classified kind plus the underlying detail.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", self.kind.as_str(), self.detail)]
pub struct EngineFailure {
    pub kind: EngineFailureKind,
    pub detail: String,
}

impl EngineFailure {
    pub fn new(kind: EngineFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::NetworkError, detail)
    }

    pub fn rate_limited(detail: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::RateLimited, detail)
    }

    pub fn auth_rejected(detail: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::AuthRejected, detail)
    }

    pub fn format_unavailable(detail: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::FormatUnavailable, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(EngineFailureKind::Unknown, detail)
    }
}

/// A successful engine attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResult {
    /// Where the finished file landed.
    pub output_path: PathBuf,
    /// Media duration in seconds, when the engine could determine it.
    pub duration_secs: Option<f64>,
    /// Container format of the finished file.
    pub final_format: String,
}

/// Cooperative cancellation flag shared between the manager and an in-flight
/// engine call. Engines check it at their own pace; there is no preemption.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolved outbound proxy, injected by the caller. The core never reads
/// proxy settings from the environment itself.
#[derive(Debug, Clone, Default)]
pub struct ProxyHandle(Option<String>);

impl ProxyHandle {
    /// No proxy; direct connections.
    pub fn direct() -> Self {
        Self(None)
    }

    /// Route through the given proxy URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self(Some(url.into()))
    }

    pub fn url(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Trait for download engine backends.
///
/// Implementations receive a read-only job spec plus the current auth
/// context and either produce a file in their configured output directory
/// or a classified [`EngineFailure`]. They must observe `cancel` at network
/// checkpoints.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Which slot this engine fills in the selection policy.
    fn kind(&self) -> EngineKind;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Whether this engine can handle the given spec at all.
    fn supports(&self, spec: &JobSpec) -> bool;

    /// Run one extraction attempt to completion.
    async fn extract(
        &self,
        job_id: &str,
        spec: &JobSpec,
        auth: &AuthContext,
        cancel: &CancelFlag,
    ) -> Result<EngineResult, EngineFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_roundtrip() {
        assert_eq!(EngineKind::parse("primary"), Some(EngineKind::Primary));
        assert_eq!(EngineKind::parse("secondary"), Some(EngineKind::Secondary));
        assert_eq!(EngineKind::parse("tertiary"), None);
        assert_eq!(EngineKind::Primary.as_str(), "primary");
        assert_eq!(EngineKind::Primary.other(), EngineKind::Secondary);
        assert_eq!(EngineKind::Secondary.other(), EngineKind::Primary);
    }

    #[test]
    fn test_failure_display() {
        let f = EngineFailure::rate_limited("HTTP 429");
        assert_eq!(f.to_string(), "rate_limited: HTTP 429");
        assert_eq!(f.kind, EngineFailureKind::RateLimited);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_proxy_handle() {
        assert!(ProxyHandle::direct().url().is_none());
        assert_eq!(
            ProxyHandle::new("socks5://localhost:9050").url(),
            Some("socks5://localhost:9050")
        );
    }
}
