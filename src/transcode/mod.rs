//! Transcoding adapter: converts a fetched file into the target container.
//!
//! Failures here are non-fatal by design: the pipeline falls back to the
//! untranscoded primary file instead of failing the job.

use crate::config::{JobsConfig, ToolsConfig};
use crate::error::TranscodeError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Extract/re-encode the audio track into `output` at `bitrate_kbps`,
    /// optionally applying loudness normalization.
    async fn to_audio(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
        normalize: bool,
    ) -> Result<(), TranscodeError>;

    /// Remux into the target container with stream copy.
    async fn to_video(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

pub struct FfmpegTranscoder {
    binary: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(tools: &ToolsConfig, jobs: &JobsConfig) -> Self {
        Self {
            binary: tools.ffmpeg.clone(),
            timeout: Duration::from_secs(jobs.transcode_timeout_secs),
        }
    }

    async fn run(&self, args: &[String]) -> Result<(), TranscodeError> {
        debug!(binary = %self.binary, ?args, "invoking transcoder");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("ffmpeg exited with {}", output.status));
            return Err(TranscodeError::Failed(detail));
        }

        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_audio(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
        normalize: bool,
    ) -> Result<(), TranscodeError> {
        let args = audio_args(input, output, bitrate_kbps, normalize);
        self.run(&args).await
    }

    async fn to_video(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let args = remux_args(input, output);
        self.run(&args).await
    }
}

fn audio_args(input: &Path, output: &Path, bitrate_kbps: u32, normalize: bool) -> Vec<String> {
    let mut args = vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vn".into(),
    ];
    if normalize {
        args.extend(["-af".into(), "loudnorm".into()]);
    }
    args.extend([
        "-b:a".into(),
        format!("{bitrate_kbps}k"),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

fn remux_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}
