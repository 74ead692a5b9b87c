//! Artifact file serving with HTTP range and conditional request support.
//!
//! Media clients retry partial downloads, so `/file/{job}/{name}` must answer
//! byte-range requests with correct `Content-Range`/`Content-Length` and
//! carry validators (`ETag`, `Last-Modified`). Responses are marked as
//! attachments and never cached: artifacts are ephemeral.

use crate::error::ApiError;
use crate::jobs::JobStatus;
use crate::server::AppContext;
use crate::store::is_valid_job_id;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Serve the current artifact of a `done` job: the stable indirection behind
/// `dl_url`. 404 until the job completes.
pub async fn serve_latest(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let job = ctx.store.read(&job_id).ok_or(ApiError::NotFound)?;
    if job.status != JobStatus::Done {
        return Err(ApiError::NotFound);
    }
    let filename = job.filename.ok_or(ApiError::NotFound)?;
    serve(&ctx, &job_id, &filename, &headers).await
}

/// Serve a named file from a job's storage directory.
pub async fn serve_file(
    State(ctx): State<AppContext>,
    Path((job_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve(&ctx, &job_id, &filename, &headers).await
}

async fn serve(
    ctx: &AppContext,
    job_id: &str,
    filename: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    if !is_valid_job_id(job_id) || !is_safe_filename(filename) {
        return Err(ApiError::NotFound);
    }

    let path = ctx.store.job_dir(job_id).join(filename);
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ApiError::NotFound)?;
    if !meta.is_file() {
        return Err(ApiError::NotFound);
    }

    let file_size = meta.len();
    let modified = meta.modified().ok();
    let etag = make_etag(file_size, modified);
    let last_modified = modified.map(format_http_date);

    // Conditional requests: validators win over ranges.
    if is_not_modified(headers, &etag, modified) {
        let mut builder = Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, &etag)
            .header(header::CACHE_CONTROL, "no-store");
        if let Some(ref lm) = last_modified {
            builder = builder.header(header::LAST_MODIFIED, lm);
        }
        return builder
            .body(Body::empty())
            .map_err(|e| ApiError::Internal(e.to_string()));
    }

    // An If-Range validator that no longer matches degrades to the full file.
    let range_requested = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .filter(|_| if_range_matches(headers, &etag, last_modified.as_deref()));

    let range = match range_requested.map(|r| parse_range_header(r, file_size)) {
        Some(ParsedRange::Bytes(start, end)) => Some((start, end)),
        Some(ParsedRange::Unsatisfiable) => {
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{file_size}"))
                .header(header::CACHE_CONTROL, "no-store")
                .body(Body::empty())
                .map_err(|e| ApiError::Internal(e.to_string()));
        }
        // Syntactically invalid Range headers are ignored.
        Some(ParsedRange::Invalid) | None => None,
    };

    let content_type = content_type_for(filename);
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "'"));

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::ETAG, &etag);
    if let Some(ref lm) = last_modified {
        builder = builder.header(header::LAST_MODIFIED, lm);
    }

    let mut file = File::open(&path).await.map_err(|_| ApiError::NotFound)?;

    match range {
        Some((start, end)) => {
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;

            let stream = ReaderStream::new(file.take(length));
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                )
                .body(Body::from_stream(stream))
                .map_err(|e| ApiError::Internal(e.to_string()))
        }
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, file_size.to_string())
            .body(Body::from_stream(ReaderStream::new(file)))
            .map_err(|e| ApiError::Internal(e.to_string())),
    }
}

/// Single path segment only; `..` and separators never reach the filesystem.
fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

fn make_etag(file_size: u64, modified: Option<SystemTime>) -> String {
    let mtime = modified
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("\"{file_size:x}-{mtime:x}\"")
}

fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_not_modified(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|h| h.to_str().ok()) {
        return if_none_match
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == "*" || candidate == etag);
    }

    if let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_http_date)
    {
        if let Some(modified) = modified {
            // Compare at second granularity, matching the header's precision.
            let modified = DateTime::<Utc>::from(modified).timestamp();
            return modified <= since.timestamp();
        }
    }

    false
}

/// `If-Range` gates the range: serve a partial response only when the client's
/// validator still describes the file. Absent header means ranges apply.
fn if_range_matches(headers: &HeaderMap, etag: &str, last_modified: Option<&str>) -> bool {
    let Some(if_range) = headers.get(header::IF_RANGE).and_then(|h| h.to_str().ok()) else {
        return true;
    };
    if if_range.starts_with('"') {
        return if_range == etag;
    }
    last_modified == Some(if_range)
}

enum ParsedRange {
    Bytes(u64, u64),
    Unsatisfiable,
    Invalid,
}

/// Parse an HTTP Range header.
///
/// Supports `bytes=0-499`, `bytes=500-`, and `bytes=-500` (suffix). A range
/// that cannot be satisfied against `file_size` is distinguished from a
/// malformed header: the former earns a 416, the latter is ignored.
fn parse_range_header(header: &str, file_size: u64) -> ParsedRange {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return ParsedRange::Invalid;
    };

    let parts: Vec<&str> = spec.split('-').collect();
    if parts.len() != 2 {
        return ParsedRange::Invalid;
    }

    let start = parts[0].trim();
    let end = parts[1].trim();

    match (start.is_empty(), end.is_empty()) {
        // bytes=-500 (last 500 bytes)
        (true, false) => {
            let Ok(suffix_len) = end.parse::<u64>() else {
                return ParsedRange::Invalid;
            };
            if suffix_len == 0 || file_size == 0 {
                return ParsedRange::Unsatisfiable;
            }
            let start = file_size.saturating_sub(suffix_len);
            ParsedRange::Bytes(start, file_size - 1)
        }
        // bytes=500- (from 500 to end)
        (false, true) => {
            let Ok(start) = start.parse::<u64>() else {
                return ParsedRange::Invalid;
            };
            if start >= file_size {
                return ParsedRange::Unsatisfiable;
            }
            ParsedRange::Bytes(start, file_size - 1)
        }
        // bytes=0-499
        (false, false) => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return ParsedRange::Invalid;
            };
            if start > end {
                return ParsedRange::Invalid;
            }
            if start >= file_size {
                return ParsedRange::Unsatisfiable;
            }
            ParsedRange::Bytes(start, end.min(file_size - 1))
        }
        // bytes=-
        (true, true) => ParsedRange::Invalid,
    }
}

/// Determine content type from the filename extension.
fn content_type_for(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "opus" | "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
