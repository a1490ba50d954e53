//! Analysis job API handlers
//!
//! **[SVA-API-010]** POST /analysis/jobs, GET /analysis/jobs/{job_id}.
//! The polling response is always structurally complete: events and metrics
//! are null-filled defaults for jobs without a result yet.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::models::{
    AnalysisJob, JobClassification, JobStatus, SwingEvents, SwingMetrics,
};
use crate::workflow::SubmitRequest;
use crate::{error::{ApiError, ApiResult}, AppState};

/// POST /analysis/jobs response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    /// Whether this submission dispatched a new pipeline execution
    pub dispatched: bool,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

/// GET /analysis/jobs/{job_id} response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub classification: Option<JobClassification>,
    pub error_message: Option<String>,
    pub events: SwingEvents,
    pub metrics: SwingMetrics,
    pub summary: String,
    pub impact_source: Option<String>,
    pub warnings: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobStatusResponse {
    pub fn from_job(job: AnalysisJob) -> Self {
        let (events, metrics, impact_source, warnings) = match job.result {
            Some(result) => (
                result.events,
                result.metrics,
                result.impact_source,
                result.warnings,
            ),
            None => (
                SwingEvents::default(),
                SwingMetrics::default(),
                None,
                Vec::new(),
            ),
        };
        let summary = metrics.summary.clone();

        Self {
            job_id: job.job_id,
            status: job.status,
            classification: job.classification,
            error_message: job.error_message,
            events,
            metrics,
            summary,
            impact_source,
            warnings,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// Build analysis job routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/jobs", post(submit_job))
        .route("/analysis/jobs/:job_id", get(get_job))
}

/// **[SVA-API-010]** POST /analysis/jobs
///
/// Accept an analysis submission. Returns 202 Accepted; the pipeline runs
/// in the background and the caller polls for the result.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let outcome = state.runner.submit(request).await?;

    let response = SubmitJobResponse {
        job_id: outcome.job.job_id.clone(),
        status: outcome.job.status,
        dispatched: outcome.dispatched,
        requested_at: outcome.job.requested_at,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// **[SVA-API-010]** GET /analysis/jobs/{job_id}
///
/// Poll job state and result.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = crate::db::jobs::load_job(&state.db, &job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("analysis job not found: {}", job_id)))?;

    tracing::debug!(job_id = %job_id, status = %job.status, "status query");

    Ok(Json(JobStatusResponse::from_job(job)))
}
