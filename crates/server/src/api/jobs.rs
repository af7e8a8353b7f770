//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vidley_core::{
    EngineKind, Job, JobFilter, JobSpec, JobStatus, ManagerError, OutputFormat, Quality,
};

use crate::metrics::JOBS_CREATED_TOTAL;
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct SubmitJobBody {
    /// Source media URL
    pub source_url: String,
    /// Requested quality (default: best)
    pub requested_quality: Option<Quality>,
    /// Extract audio only (default: false)
    pub audio_only: Option<bool>,
    /// Output container format (default: mp4)
    pub output_format: Option<OutputFormat>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for job operations
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub source_url: String,
    pub requested_quality: Quality,
    pub audio_only: bool,
    pub output_format: OutputFormat,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_used: Option<EngineKind>,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            source_url: job.spec.source_url,
            requested_quality: job.spec.requested_quality,
            audio_only: job.spec.audio_only,
            output_format: job.spec.output_format,
            status: job.status,
            engine_used: job.engine_used,
            attempt_count: job.attempt_count,
            last_error: job.last_error,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
            output_path: job.output_path.map(|p| p.display().to_string()),
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<JobErrorResponse>) {
    (
        status,
        Json(JobErrorResponse {
            error: error.into(),
        }),
    )
}

fn manager_error_response(e: ManagerError) -> (StatusCode, Json<JobErrorResponse>) {
    let status = match e {
        ManagerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
        ManagerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new download job
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitJobBody>,
) -> Result<(StatusCode, Json<JobResponse>), impl IntoResponse> {
    let mut spec = JobSpec::new(body.source_url);
    if let Some(quality) = body.requested_quality {
        spec = spec.with_quality(quality);
    }
    if let Some(audio_only) = body.audio_only {
        spec = spec.with_audio_only(audio_only);
    }
    if let Some(format) = body.output_format {
        spec = spec.with_output_format(format);
    }

    let job_id = state
        .manager()
        .submit(spec)
        .await
        .map_err(manager_error_response)?;

    JOBS_CREATED_TOTAL.inc();

    let job = state
        .manager()
        .query(&job_id)
        .map_err(manager_error_response)?;

    Ok::<_, (StatusCode, Json<JobErrorResponse>)>((StatusCode::CREATED, Json(JobResponse::from(job))))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.manager().query(&id) {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(e) => Err(manager_error_response(e)),
    }
}

/// List jobs, optionally filtered by status
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref status) = params.status {
        filter = filter.with_status(status.clone());
    }

    let jobs = state
        .manager()
        .list(&filter)
        .map_err(manager_error_response)?;
    let total = state
        .manager()
        .count(&filter)
        .map_err(manager_error_response)?;

    Ok::<_, (StatusCode, Json<JobErrorResponse>)>(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Cancel a job (idempotent for terminal jobs)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, impl IntoResponse> {
    match state.manager().cancel(&id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(manager_error_response(e)),
    }
}
