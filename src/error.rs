//! Error taxonomy for the job pipeline and the HTTP surface.
//!
//! Pipeline failures are asynchronous: they are recorded on the job record
//! and observed by polling, never surfaced on the submission response. Only
//! client-input and not-found errors map to synchronous HTTP statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Fatal pipeline failures. Any of these moves a job to the `error` state.
#[derive(Debug, Error)]
pub enum JobError {
    /// Source resolution/download failed (network error, unsupported URL,
    /// extractor crash or timeout).
    #[error("{0}")]
    Extraction(String),

    /// Extraction succeeded but left no usable file in the job directory.
    #[error("no media produced")]
    NoArtifact,

    /// The job record could not be persisted.
    #[error("failed to persist job record: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extraction adapter failures, normalized from the external tool.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to launch extractor: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("extractor timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),

    #[error("unreadable extractor output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Transcoding adapter failures. Never fatal to a job: the pipeline degrades
/// to serving the untranscoded primary file.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch transcoder: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("transcoder timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),
}

/// Synchronous HTTP errors returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
