//! `yt-dlp` subprocess adapter.

use super::{Extractor, SourceInfo, StreamSelection};
use crate::config::{JobsConfig, ToolsConfig};
use crate::error::ExtractError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Subset of the JSON document `--dump-single-json` emits.
#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    entries: Option<serde::de::IgnoredAny>,
}

impl From<RawInfo> for SourceInfo {
    fn from(raw: RawInfo) -> Self {
        Self {
            title: raw.title,
            duration: raw.duration,
            thumbnail: raw.thumbnail,
            is_playlist: raw.entries.is_some(),
        }
    }
}

pub struct YtDlpExtractor {
    binary: String,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(tools: &ToolsConfig, jobs: &JobsConfig) -> Self {
        Self {
            binary: tools.yt_dlp.clone(),
            timeout: Duration::from_secs(jobs.extract_timeout_secs),
        }
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, ExtractError> {
        debug!(binary = %self.binary, ?args, "invoking extractor");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(ExtractError::Failed(failure_detail(&output)));
        }

        Ok(output)
    }

    fn parse_info(output: &std::process::Output) -> Result<SourceInfo, ExtractError> {
        let raw: RawInfo = serde_json::from_slice(&output.stdout)?;
        Ok(raw.into())
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn probe(&self, url: &str) -> Result<SourceInfo, ExtractError> {
        let args = probe_args(url);
        let output = self.run(&args).await?;
        Self::parse_info(&output)
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        selection: StreamSelection,
        embed_metadata: bool,
    ) -> Result<SourceInfo, ExtractError> {
        let args = fetch_args(url, dest, selection, embed_metadata);
        let output = self.run(&args).await?;
        Self::parse_info(&output)
    }
}

fn probe_args(url: &str) -> Vec<String> {
    vec![
        "--dump-single-json".into(),
        "--no-warnings".into(),
        "--skip-download".into(),
        url.into(),
    ]
}

fn fetch_args(
    url: &str,
    dest: &Path,
    selection: StreamSelection,
    embed_metadata: bool,
) -> Vec<String> {
    let mut args = vec![
        // --dump-single-json normally implies simulation; --no-simulate makes
        // yt-dlp download AND print the resolved info in one invocation.
        "--dump-single-json".into(),
        "--no-simulate".into(),
        "--no-warnings".into(),
        "--no-progress".into(),
        "-o".into(),
        dest.join("%(title).200s.%(ext)s").to_string_lossy().into_owned(),
    ];

    match selection {
        StreamSelection::BestAudio => {
            args.extend(["-f".into(), "bestaudio/best".into()]);
        }
        StreamSelection::BestVideo => {
            args.extend([
                "-f".into(),
                "bestvideo+bestaudio/best".into(),
                "--merge-output-format".into(),
                "mp4".into(),
            ]);
        }
    }

    if embed_metadata {
        args.push("--embed-metadata".into());
    }

    args.push(url.into());
    args
}

/// A failing yt-dlp run dumps pages of output; keep the last meaningful
/// stderr line for the job record.
fn failure_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("extractor exited with {}", output.status))
}
