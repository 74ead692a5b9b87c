//! Extraction adapter: resolves a media URL and materializes files on disk.
//!
//! The trait is the seam between the pipeline and the external download
//! engine; production uses [`YtDlpExtractor`], tests substitute doubles.

mod ytdlp;

pub use ytdlp::YtDlpExtractor;

use crate::error::ExtractError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

/// Metadata resolved for a source URL.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub is_playlist: bool,
}

/// Which stream to materialize for the job's target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelection {
    /// Best available audio-only stream, falling back to best combined.
    BestAudio,
    /// Best combined audio+video, merged into an mp4 container.
    BestVideo,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolve title/duration/thumbnail without downloading anything.
    async fn probe(&self, url: &str) -> Result<SourceInfo, ExtractError>;

    /// Download one or more media files into `dest` and return the resolved
    /// info. Files are named after the source title by the engine; the
    /// pipeline picks the primary one afterwards.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        selection: StreamSelection,
        embed_metadata: bool,
    ) -> Result<SourceInfo, ExtractError>;
}
