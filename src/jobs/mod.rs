//! Job records and the lifecycle state machine.
//!
//! A job is one user-submitted request to fetch and package a media URL.
//! The on-disk record (see [`crate::store`]) is the sole source of truth for
//! its status; transitions are monotonic: `queued -> processing -> done|error`.

pub mod dispatcher;
pub mod worker;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default audio bitrate in kbps when the request carries no quality hint.
pub const DEFAULT_AUDIO_BITRATE: u32 = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Mp3,
    Mp4,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Mp4 => "mp4",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, TargetFormat::Mp3)
    }
}

/// Immutable snapshot of the request, captured at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub url: String,

    #[serde(default)]
    pub format: TargetFormat,

    /// Codec-specific quality hint, e.g. an audio bitrate in kbps.
    #[serde(default)]
    pub quality: String,

    #[serde(default)]
    pub normalize: bool,

    #[serde(default)]
    pub trim: bool,

    #[serde(default = "default_true")]
    pub metadata: bool,
}

fn default_true() -> bool {
    true
}

/// The durable per-job record, persisted as a whole document on every
/// transition. Terminal fields stay unset until the terminal state is
/// reached and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub params: JobParams,

    /// Seconds since epoch, each set exactly once.
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playlist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fields published when a job completes.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub title: String,
    pub filename: String,
    pub is_playlist: bool,
    pub download_url: String,
    pub dl_url: String,
    pub qr_url: Option<String>,
}

impl Job {
    pub fn new(job_id: String, params: JobParams) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            params,
            created_at: now(),
            started_at: None,
            finished_at: None,
            title: None,
            filename: None,
            is_playlist: None,
            download_url: None,
            dl_url: None,
            qr_url: None,
            error: None,
        }
    }

    pub fn begin(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(now());
    }

    pub fn complete(&mut self, outcome: JobOutcome) {
        self.status = JobStatus::Done;
        self.title = Some(outcome.title);
        self.filename = Some(outcome.filename);
        self.is_playlist = Some(outcome.is_playlist);
        self.download_url = Some(outcome.download_url);
        self.dl_url = Some(outcome.dl_url);
        self.qr_url = outcome.qr_url;
        self.finished_at = Some(now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Error;
        self.error = Some(error.to_string());
        self.finished_at = Some(now());
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Generate a fresh job identifier: 12 hex chars of a UUIDv4, which carries
/// 48 bits of entropy. Collisions against existing directories are not
/// checked; the probability is negligible at this scale.
pub fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Reduce a resolved title to a safe output filename stem: alphanumerics,
/// spaces and a small punctuation whitelist survive, everything else is
/// dropped.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || " .-_()[]{}".contains(*c))
        .collect::<String>()
        .trim()
        .to_string()
}
