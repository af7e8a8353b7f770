use axum::{
    extract::State,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{admin, handlers, jobs};
use crate::metrics;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Jobs
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}", delete(jobs::cancel_job))
        // Admin
        .route("/admin/cleanup", post(admin::enforce_quota))
        .route("/admin/token", get(admin::token_status))
        .route("/admin/token/invalidate", post(admin::invalidate_token))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(render_metrics).with_state(state))
        .layer(middleware::from_fn(super::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Prometheus text endpoint; job gauges are refreshed at scrape time.
async fn render_metrics(State(state): State<Arc<AppState>>) -> String {
    for status in ["pending", "running", "completed", "failed", "cancelled"] {
        let count = state
            .manager()
            .count(&vidley_core::JobFilter::new().with_status(status))
            .unwrap_or(0);
        metrics::JOBS_BY_STATUS
            .with_label_values(&[status])
            .set(count);
    }
    metrics::render()
}
