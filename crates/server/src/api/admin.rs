//! Admin API handlers: manual eviction and token management.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use vidley_core::EvictionReport;

use crate::metrics::{BYTES_FREED_TOTAL, FILES_EVICTED_TOTAL};
use crate::state::AppState;

/// Error response
#[derive(Debug, Serialize)]
pub struct AdminErrorResponse {
    pub error: String,
}

/// Sanitized token status for the admin API; never exposes token material.
#[derive(Debug, Serialize)]
pub struct TokenStatusResponse {
    pub present: bool,
    pub verified_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<String>,
    pub source: String,
}

/// Manually trigger a storage eviction pass
pub async fn enforce_quota(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvictionReport>, impl IntoResponse> {
    match state.cleaner().enforce_quota() {
        Ok(report) => {
            for evicted in &report.evicted {
                FILES_EVICTED_TOTAL
                    .with_label_values(&[match evicted.reason {
                        vidley_core::EvictionReason::Age => "age",
                        vidley_core::EvictionReason::Quota => "quota",
                    }])
                    .inc();
            }
            BYTES_FREED_TOTAL.inc_by(report.bytes_freed);
            Ok(Json(report))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdminErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Current auth token status (sanitized)
pub async fn token_status(State(state): State<Arc<AppState>>) -> Json<TokenStatusResponse> {
    match state.tokens().current().await {
        Some(ctx) => Json(TokenStatusResponse {
            present: ctx.has_token(),
            verified_valid: ctx.verified_valid,
            last_verified_at: ctx.last_verified_at.map(|t| t.to_rfc3339()),
            source: ctx.source,
        }),
        None => Json(TokenStatusResponse {
            present: false,
            verified_valid: false,
            last_verified_at: None,
            source: String::new(),
        }),
    }
}

/// Force the cached token invalid so the next job re-verifies
pub async fn invalidate_token(State(state): State<Arc<AppState>>) -> StatusCode {
    state.tokens().invalidate("admin-api").await;
    StatusCode::NO_CONTENT
}
