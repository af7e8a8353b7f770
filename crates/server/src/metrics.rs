//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the vidley server:
//! - HTTP request metrics (latency, counts, in-flight)
//! - Job metrics (created, by state, terminal outcomes)
//! - Eviction metrics

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidley_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidley_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidley_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs by current status (collected dynamically at scrape time).
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("vidley_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Jobs created total.
pub static JOBS_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidley_jobs_created_total",
        "Total jobs submitted since startup",
    )
    .unwrap()
});

// =============================================================================
// Eviction Metrics
// =============================================================================

/// Files evicted by the storage cleaner.
pub static FILES_EVICTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidley_files_evicted_total", "Files evicted by reason"),
        &["reason"],
    )
    .unwrap()
});

/// Bytes freed by the storage cleaner.
pub static BYTES_FREED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidley_eviction_bytes_freed_total",
        "Bytes freed by eviction since startup",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();
    registry
        .register(Box::new(JOBS_CREATED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(FILES_EVICTED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(BYTES_FREED_TOTAL.clone()))
        .unwrap();
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collapse path segments that contain identifiers so metric cardinality
/// stays bounded (e.g. `/api/v1/jobs/3f9a...` -> `/api/v1/jobs/{id}`).
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/') {
        let looks_like_id = segment.len() >= 16
            || (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()));
        if looks_like_id {
            segments.push("{id}".to_string());
        } else {
            segments.push(segment.to_string());
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_ids() {
        assert_eq!(
            normalize_path("/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/jobs/{id}"
        );
        assert_eq!(normalize_path("/api/v1/jobs/12345"), "/api/v1/jobs/{id}");
        assert_eq!(normalize_path("/api/v1/jobs"), "/api/v1/jobs");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_render_includes_registered_metrics() {
        JOBS_CREATED_TOTAL.inc();
        let text = render();
        assert!(text.contains("vidley_jobs_created_total"));
    }
}
