//! JSON API: health, source info, job submission and the share projection.

use crate::error::ApiError;
use crate::fetch::SourceInfo;
use crate::jobs::{JobParams, JobStatus, TargetFormat};
use crate::server::AppContext;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

pub async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "host": ctx.public_url,
    }))
}

#[derive(Deserialize)]
pub struct InfoRequest {
    url: Option<String>,
}

/// Resolve source metadata without creating a job.
pub async fn info(
    State(ctx): State<AppContext>,
    Json(payload): Json<InfoRequest>,
) -> Result<Json<SourceInfo>, ApiError> {
    let url = payload
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing url parameter".to_string()))?;

    let info = ctx
        .extractor
        .probe(url)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(info))
}

#[derive(Deserialize)]
pub struct DownloadRequest {
    url: Option<String>,
    format: Option<TargetFormat>,
    quality: Option<String>,
    normalize: Option<bool>,
    trim: Option<bool>,
    metadata: Option<bool>,
}

/// Create a job and return its id immediately; the pipeline outcome is
/// observable only by polling `/share/{job_id}`.
pub async fn download(
    State(ctx): State<AppContext>,
    Json(payload): Json<DownloadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let params = JobParams {
        url: payload.url.unwrap_or_default(),
        format: payload.format.unwrap_or_default(),
        quality: payload.quality.unwrap_or_default(),
        normalize: payload.normalize.unwrap_or(false),
        trim: payload.trim.unwrap_or(false),
        metadata: payload.metadata.unwrap_or(true),
    };

    let job_id = ctx.dispatcher.submit(params).await?;
    Ok(Json(json!({ "job_id": job_id })))
}

/// Read-only projection of the job record. Performs no mutation and is safe
/// to call arbitrarily often while the pipeline runs.
pub async fn share(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = ctx.store.read(&job_id).ok_or(ApiError::NotFound)?;

    let response = match job.status {
        JobStatus::Done => Json(json!({
            "job_id": job.job_id,
            "status": job.status,
            "filename": job.filename,
            "title": job.title,
            "download_url": job.download_url,
            "dl_url": job.dl_url,
            "qr_url": job.qr_url,
        }))
        .into_response(),
        JobStatus::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "job_id": job.job_id,
                "status": job.status,
                "error": job.error,
            })),
        )
            .into_response(),
        JobStatus::Queued | JobStatus::Processing => Json(json!({
            "job_id": job.job_id,
            "status": job.status,
        }))
        .into_response(),
    };

    Ok(response)
}
