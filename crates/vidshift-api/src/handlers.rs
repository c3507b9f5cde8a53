//! HTTP handlers.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use vidshift_models::{JobId, JobRecord, RawOptions, TransformOptions};
use vidshift_worker::{CancelOutcome, JobError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters of an upload submission.
#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    /// Original file name of the uploaded video
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(flatten)]
    pub options: RawOptions,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Accept a raw-body video upload and start a job.
pub async fn submit_job(
    State(state): State<AppState>,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let filename = query.filename.unwrap_or_default();
    let options = TransformOptions::parse(&query.options).map_err(JobError::from)?;

    let job_id = state.service.accept_upload(&filename, options, &body).await?;
    info!(job_id = %job_id, bytes = body.len(), "Upload accepted");

    Ok((StatusCode::CREATED, Json(SubmitResponse { job_id })))
}

/// Current record of a job.
pub async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobRecord>> {
    let record = state.service.get_status(&JobId::from_string(job_id)).await?;
    Ok(Json(record))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub message: String,
    pub status: String,
}

/// Request cancellation of a live job.
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<CancelResponse>> {
    match state.service.request_cancel(&JobId::from_string(job_id)).await {
        CancelOutcome::Accepted => Ok(Json(CancelResponse {
            message: "Job cancellation requested".to_string(),
            status: "cancelled".to_string(),
        })),
        CancelOutcome::NotFound => Err(ApiError::not_found("Job not found or already completed")),
    }
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub store: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub backend: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Readiness check endpoint (readiness probe).
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let store = state.service.store();
    let start = Instant::now();
    let check = match store.ping().await {
        Ok(()) => CheckStatus {
            backend: store.backend_name().to_string(),
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => CheckStatus {
            backend: store.backend_name().to_string(),
            status: "error".to_string(),
            error: Some(e.to_string()),
            latency_ms: None,
        },
    };

    if check.status == "ok" {
        Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            store: check,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "degraded".to_string(),
                store: check,
            }),
        ))
    }
}
