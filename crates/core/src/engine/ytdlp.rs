//! yt-dlp download engine implementation.
//!
//! Drives the external `yt-dlp` binary: broadest site coverage and the only
//! engine that can negotiate formats on the primary video source. Auth
//! material (proof token, visitor id) is forwarded through extractor
//! arguments; the same binary in `--simulate` mode doubles as the token
//! verification probe so probe and download share one outbound path.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::YtDlpConfig;
use crate::job::JobSpec;
use crate::token::{AuthContext, ProbeFailure, TokenProbe};

use super::{
    CancelFlag, EngineFailure, EngineFailureKind, EngineKind, EngineResult, MediaEngine,
    ProxyHandle,
};

/// How often the cancel flag is polled while the child runs.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Destination lines yt-dlp logs while downloading/merging, used as a
/// fallback when the `--print` output is missing.
static DESTINATION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\[(?:download|Merger|ExtractAudio)\].*?(?:Destination:|into) "?(?<path>[^"]+?)"?$"#)
        .expect("valid regex")
});

/// Primary download engine backed by the yt-dlp binary.
pub struct YtDlpEngine {
    config: YtDlpConfig,
    proxy: ProxyHandle,
}

impl YtDlpEngine {
    pub fn new(config: YtDlpConfig, proxy: ProxyHandle) -> Self {
        Self { config, proxy }
    }

    /// Format selector expression for the requested quality.
    fn format_selector(spec: &JobSpec) -> String {
        if spec.audio_only {
            return "bestaudio/best".to_string();
        }
        match spec.requested_quality {
            crate::job::Quality::Best => "bestvideo*+bestaudio/best".to_string(),
            crate::job::Quality::P1080 => {
                "bestvideo*[height<=1080]+bestaudio/best[height<=1080]".to_string()
            }
            crate::job::Quality::P720 => {
                "bestvideo*[height<=720]+bestaudio/best[height<=720]".to_string()
            }
            crate::job::Quality::Worst => "worstvideo*+worstaudio/worst".to_string(),
        }
    }

    /// Extractor-args string carrying the auth material, if any.
    fn extractor_args(auth: &AuthContext) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(ref proof) = auth.proof_token {
            parts.push(format!("po_token=web+{}", proof));
        }
        if let Some(ref visitor) = auth.visitor_id {
            parts.push(format!("visitor_data={}", visitor));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("youtube:{}", parts.join(";")))
        }
    }

    fn build_args(&self, job_id: &str, spec: &JobSpec, auth: &AuthContext) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            Self::format_selector(spec),
            "-o".to_string(),
            self.config
                .output_dir
                .join(format!("{}.%(ext)s", job_id))
                .to_string_lossy()
                .to_string(),
            // Printed after all post-processing so we learn the final path.
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--print".to_string(),
            "after_move:%(duration)s".to_string(),
        ];

        if spec.audio_only {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push(spec.output_format.extension().to_string());
        } else {
            args.push("--merge-output-format".to_string());
            args.push(spec.output_format.extension().to_string());
        }

        if let Some(proxy) = self.proxy.url() {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }

        if let Some(extractor) = Self::extractor_args(auth) {
            args.push("--extractor-args".to_string());
            args.push(extractor);
        }

        if let Some(ref oauth) = auth.oauth_token {
            args.push("--add-headers".to_string());
            args.push(format!("Authorization:Bearer {}", oauth));
        }

        args.extend(self.config.extra_args.iter().cloned());
        args.push(spec.source_url.clone());
        args
    }

    /// Classify a failed run from its stderr. Order matters: a 429 body
    /// often also mentions 403-adjacent wording.
    fn classify_stderr(stderr: &str) -> EngineFailure {
        let lower = stderr.to_lowercase();

        const RATE_LIMITED: &[&str] = &["429", "too many requests", "rate-limit", "rate limit"];
        const AUTH_REJECTED: &[&str] = &[
            "sign in to confirm",
            "not a bot",
            "403",
            "forbidden",
            "po_token",
            "login required",
            "account cookies",
        ];
        const FORMAT_UNAVAILABLE: &[&str] = &[
            "requested format is not available",
            "no video formats",
            "format is not available",
            "unsupported url",
        ];
        const NETWORK: &[&str] = &[
            "unable to download",
            "timed out",
            "connection",
            "getaddrinfo",
            "temporary failure",
            "network",
            "incomplete read",
        ];

        let detail = stderr
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .unwrap_or_else(|| stderr.lines().last().unwrap_or("yt-dlp failed"))
            .trim()
            .to_string();

        let kind = if RATE_LIMITED.iter().any(|m| lower.contains(m)) {
            EngineFailureKind::RateLimited
        } else if AUTH_REJECTED.iter().any(|m| lower.contains(m)) {
            EngineFailureKind::AuthRejected
        } else if FORMAT_UNAVAILABLE.iter().any(|m| lower.contains(m)) {
            EngineFailureKind::FormatUnavailable
        } else if NETWORK.iter().any(|m| lower.contains(m)) {
            EngineFailureKind::NetworkError
        } else {
            EngineFailureKind::Unknown
        };

        EngineFailure::new(kind, detail)
    }

    /// Pick the final file path and duration out of the `--print` lines,
    /// falling back to the `[download] Destination:` log lines.
    fn parse_stdout(&self, job_id: &str, stdout: &str) -> (Option<PathBuf>, Option<f64>) {
        let mut path = None;
        let mut duration = None;
        for line in stdout.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            let candidate = if line.contains(job_id) && !line.ends_with(".part") {
                Some(PathBuf::from(line))
            } else if let Some(captures) = DESTINATION_LINE.captures(line) {
                captures.name("path").map(|m| PathBuf::from(m.as_str()))
            } else {
                if let Ok(secs) = line.parse::<f64>() {
                    duration = Some(secs);
                }
                None
            };
            if let Some(candidate) = candidate {
                if candidate.is_file() {
                    path = Some(candidate);
                }
            }
        }
        (path, duration)
    }

    /// Fallback when stdout parsing yields nothing: scan the output dir for
    /// the job's file.
    fn scan_output_dir(&self, job_id: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.config.output_dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(job_id) && !name.ends_with(".part") && path.is_file() {
                return Some(path);
            }
        }
        None
    }

    /// Remove partial files a killed run left behind.
    fn cleanup_partials(&self, job_id: &str) {
        if let Ok(entries) = std::fs::read_dir(&self.config.output_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(job_id) && name.ends_with(".part") {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        warn!(file = %name, error = %e, "Failed to remove partial file");
                    }
                }
            }
        }
    }

    /// Run the binary, collecting stdout/stderr while watching the cancel
    /// flag. A cancelled run kills the child and cleans up partials.
    async fn run(
        &self,
        job_id: &str,
        args: &[String],
        cancel: &CancelFlag,
    ) -> Result<(bool, String, String), EngineFailure> {
        let mut child = Command::new(&self.config.binary_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineFailure::unknown(format!(
                    "failed to spawn {}: {}",
                    self.config.binary_path, e
                ))
            })?;

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout_pipe.read_to_string(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| EngineFailure::unknown(e.to_string()))?;
                }
                _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => {
                    if cancel.is_cancelled() {
                        debug!(job_id, "Cancellation observed, killing yt-dlp");
                        let _ = child.kill().await;
                        self.cleanup_partials(job_id);
                        return Err(EngineFailure::unknown("cancelled by caller"));
                    }
                }
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        Ok((status.success(), stdout, stderr))
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Primary
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn supports(&self, spec: &JobSpec) -> bool {
        // yt-dlp handles anything http(s); direct file links are merely
        // better served by the secondary engine, not unsupported here.
        spec.source_url.starts_with("http://") || spec.source_url.starts_with("https://")
    }

    async fn extract(
        &self,
        job_id: &str,
        spec: &JobSpec,
        auth: &AuthContext,
        cancel: &CancelFlag,
    ) -> Result<EngineResult, EngineFailure> {
        let args = self.build_args(job_id, spec, auth);
        debug!(job_id, url = %spec.source_url, "Starting yt-dlp extraction");

        let (success, stdout, stderr) = self.run(job_id, &args, cancel).await?;

        if !success {
            self.cleanup_partials(job_id);
            return Err(Self::classify_stderr(&stderr));
        }

        let (path, duration) = self.parse_stdout(job_id, &stdout);
        let output_path = path
            .or_else(|| self.scan_output_dir(job_id))
            .ok_or_else(|| {
                EngineFailure::unknown("yt-dlp reported success but produced no output file")
            })?;

        let final_format = output_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| spec.output_format.extension().to_string());

        Ok(EngineResult {
            output_path,
            duration_secs: duration,
            final_format,
        })
    }
}

#[async_trait]
impl TokenProbe for YtDlpEngine {
    /// Minimal extraction (`--simulate`) against the configured probe URL.
    /// Routed through the same proxy as downloads by construction.
    async fn probe(&self, auth: &AuthContext) -> Result<(), ProbeFailure> {
        let mut args: Vec<String> = vec![
            "--simulate".to_string(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
        ];

        if let Some(proxy) = self.proxy.url() {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }
        if let Some(extractor) = Self::extractor_args(auth) {
            args.push("--extractor-args".to_string());
            args.push(extractor);
        }
        args.push(self.config.probe_url.clone());

        let output = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeFailure::Inconclusive(e.to_string()))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        match Self::classify_stderr(&stderr).kind {
            EngineFailureKind::AuthRejected => {
                Err(ProbeFailure::Rejected(stderr.trim().to_string()))
            }
            _ => Err(ProbeFailure::Inconclusive(stderr.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{OutputFormat, Quality};

    fn engine() -> YtDlpEngine {
        YtDlpEngine::new(
            YtDlpConfig {
                binary_path: "yt-dlp".to_string(),
                output_dir: PathBuf::from("/tmp/vidley-test"),
                probe_url: "https://example.com/probe".to_string(),
                extra_args: vec![],
            },
            ProxyHandle::direct(),
        )
    }

    #[test]
    fn test_format_selector() {
        let best = JobSpec::new("https://example.com/v/1");
        assert_eq!(YtDlpEngine::format_selector(&best), "bestvideo*+bestaudio/best");

        let audio = JobSpec::new("https://example.com/v/1").with_audio_only(true);
        assert_eq!(YtDlpEngine::format_selector(&audio), "bestaudio/best");

        let p720 = JobSpec::new("https://example.com/v/1").with_quality(Quality::P720);
        assert!(YtDlpEngine::format_selector(&p720).contains("height<=720"));
    }

    #[test]
    fn test_extractor_args_from_auth() {
        assert!(YtDlpEngine::extractor_args(&AuthContext::empty()).is_none());

        let auth = AuthContext {
            proof_token: Some("PROOF".to_string()),
            visitor_id: Some("VISITOR".to_string()),
            ..Default::default()
        };
        let args = YtDlpEngine::extractor_args(&auth).unwrap();
        assert_eq!(args, "youtube:po_token=web+PROOF;visitor_data=VISITOR");
    }

    #[test]
    fn test_build_args_carries_proxy_and_url() {
        let engine = YtDlpEngine::new(
            YtDlpConfig {
                binary_path: "yt-dlp".to_string(),
                output_dir: PathBuf::from("/out"),
                probe_url: "https://example.com/probe".to_string(),
                extra_args: vec![],
            },
            ProxyHandle::new("socks5://localhost:9050"),
        );
        let spec = JobSpec::new("https://example.com/v/1");
        let args = engine.build_args("job-1", &spec, &AuthContext::empty());

        assert!(args.contains(&"--proxy".to_string()));
        assert!(args.contains(&"socks5://localhost:9050".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/v/1");
        assert!(args.iter().any(|a| a.contains("job-1.%(ext)s")));
    }

    #[test]
    fn test_build_args_audio_only() {
        let spec = JobSpec::new("https://example.com/v/1")
            .with_audio_only(true)
            .with_output_format(OutputFormat::Mp3);
        let args = engine().build_args("job-1", &spec, &AuthContext::empty());
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"mp3".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn test_classify_stderr() {
        let cases = [
            ("ERROR: HTTP Error 429: Too Many Requests", EngineFailureKind::RateLimited),
            (
                "ERROR: Sign in to confirm you're not a bot",
                EngineFailureKind::AuthRejected,
            ),
            ("ERROR: HTTP Error 403: Forbidden", EngineFailureKind::AuthRejected),
            (
                "ERROR: Requested format is not available",
                EngineFailureKind::FormatUnavailable,
            ),
            (
                "ERROR: Unable to download webpage: timed out",
                EngineFailureKind::NetworkError,
            ),
            ("ERROR: something exotic happened", EngineFailureKind::Unknown),
        ];
        for (stderr, expected) in cases {
            assert_eq!(
                YtDlpEngine::classify_stderr(stderr).kind,
                expected,
                "stderr: {}",
                stderr
            );
        }
    }

    #[test]
    fn test_parse_stdout_print_and_destination_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("job-1.mp4");
        std::fs::write(&file, b"x").unwrap();

        let engine = YtDlpEngine::new(
            YtDlpConfig {
                binary_path: "yt-dlp".to_string(),
                output_dir: dir.path().to_path_buf(),
                probe_url: "https://example.com/probe".to_string(),
                extra_args: vec![],
            },
            ProxyHandle::direct(),
        );

        // --print output: path line plus duration line.
        let stdout = format!("{}\n212\n", file.display());
        let (path, duration) = engine.parse_stdout("job-1", &stdout);
        assert_eq!(path, Some(file.clone()));
        assert_eq!(duration, Some(212.0));

        // Fallback: only the progress log's destination line.
        let stdout = format!("[download] Destination: {}\n", file.display());
        let (path, _) = engine.parse_stdout("other-job", &stdout);
        assert_eq!(path, Some(file.clone()));

        // Merger quoting variant.
        let stdout = format!("[Merger] Merging formats into \"{}\"\n", file.display());
        let (path, _) = engine.parse_stdout("other-job", &stdout);
        assert_eq!(path, Some(file));
    }

    #[test]
    fn test_supports_http_only() {
        let e = engine();
        assert!(e.supports(&JobSpec::new("https://example.com/v/1")));
        assert!(e.supports(&JobSpec::new("http://example.com/v/1")));
        assert!(!e.supports(&JobSpec::new("ftp://example.com/v/1")));
    }
}
