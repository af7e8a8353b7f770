//! Direct HTTP download engine implementation.
//!
//! The lightweight secondary engine: no extractor, no format negotiation,
//! just a streaming GET for sources that already expose a direct media URL.
//! Much faster than spawning the extractor for the common "here is an .mp4"
//! case, and a fallback target when the primary engine is being rejected.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::DirectHttpConfig;
use crate::job::JobSpec;
use crate::token::AuthContext;

use super::{
    CancelFlag, EngineFailure, EngineKind, EngineResult, MediaEngine, ProxyHandle,
};

/// Media file extensions the direct engine will claim.
const DIRECT_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "avi", "mov", "mp3", "m4a", "opus", "ogg", "flac", "wav", "ts",
];

/// Secondary download engine: plain streaming HTTP.
pub struct DirectHttpEngine {
    config: DirectHttpConfig,
    client: Client,
}

impl DirectHttpEngine {
    pub fn new(config: DirectHttpConfig, proxy: ProxyHandle) -> Self {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs as u64))
            .user_agent(concat!("vidley/", env!("CARGO_PKG_VERSION")));

        if let Some(url) = proxy.url() {
            match reqwest::Proxy::all(url) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => warn!(proxy = url, error = %e, "Invalid proxy URL, going direct"),
            }
        }

        Self {
            config,
            client: builder.build().expect("Failed to create HTTP client"),
        }
    }

    /// Extension of the URL path, lowercased, if any.
    fn url_extension(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let path = parsed.path();
        let ext = path.rsplit('.').next()?;
        if ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(ext.to_ascii_lowercase())
        } else {
            None
        }
    }

    fn failure_from_status(status: reqwest::StatusCode) -> EngineFailure {
        match status.as_u16() {
            429 => EngineFailure::rate_limited(format!("HTTP {}", status)),
            401 | 403 => EngineFailure::auth_rejected(format!("HTTP {}", status)),
            404 | 410 | 415 => EngineFailure::format_unavailable(format!("HTTP {}", status)),
            500..=599 => EngineFailure::network(format!("HTTP {}", status)),
            _ => EngineFailure::unknown(format!("HTTP {}", status)),
        }
    }

    fn failure_from_reqwest(e: reqwest::Error) -> EngineFailure {
        if e.is_timeout() || e.is_connect() {
            EngineFailure::network(e.to_string())
        } else {
            EngineFailure::unknown(e.to_string())
        }
    }
}

#[async_trait]
impl MediaEngine for DirectHttpEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Secondary
    }

    fn name(&self) -> &str {
        "direct-http"
    }

    /// Only direct links to a media file; everything needing extraction
    /// belongs to the primary engine.
    fn supports(&self, spec: &JobSpec) -> bool {
        if !(spec.source_url.starts_with("http://") || spec.source_url.starts_with("https://")) {
            return false;
        }
        match Self::url_extension(&spec.source_url) {
            Some(ext) => DIRECT_EXTENSIONS.contains(&ext.as_str()),
            None => false,
        }
    }

    async fn extract(
        &self,
        job_id: &str,
        spec: &JobSpec,
        auth: &AuthContext,
        cancel: &CancelFlag,
    ) -> Result<EngineResult, EngineFailure> {
        debug!(job_id, url = %spec.source_url, "Starting direct HTTP download");

        let mut request = self.client.get(&spec.source_url);
        if let Some(ref oauth) = auth.oauth_token {
            request = request.bearer_auth(oauth);
        }

        let response = request
            .send()
            .await
            .map_err(Self::failure_from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failure_from_status(status));
        }

        let ext = Self::url_extension(&spec.source_url)
            .unwrap_or_else(|| spec.output_format.extension().to_string());
        let part_path = self.config.output_dir.join(format!("{}.part", job_id));
        let final_path: PathBuf = self.config.output_dir.join(format!("{}.{}", job_id, ext));

        let mut file = tokio::fs::File::create(&part_path)
            .await
            .map_err(|e| EngineFailure::unknown(format!("create {:?}: {}", part_path, e)))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                debug!(job_id, "Cancellation observed, aborting direct download");
                drop(file);
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(EngineFailure::unknown("cancelled by caller"));
            }
            let chunk = chunk.map_err(|e| {
                // A transfer dying mid-stream is a network problem even when
                // reqwest reports it as a body error.
                EngineFailure::network(format!("transfer interrupted: {}", e))
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| EngineFailure::unknown(format!("write {:?}: {}", part_path, e)))?;
        }

        file.flush()
            .await
            .map_err(|e| EngineFailure::unknown(e.to_string()))?;
        drop(file);

        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| EngineFailure::unknown(format!("rename to {:?}: {}", final_path, e)))?;

        Ok(EngineResult {
            output_path: final_path,
            duration_secs: None,
            final_format: ext,
        })
    }
}
