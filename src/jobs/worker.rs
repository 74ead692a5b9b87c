//! Pipeline workers: a bounded pool consuming job ids from the queue.
//!
//! Each worker owns the jobs it picks up exclusively, so the record store
//! needs no locking beyond its atomic document replace. The pipeline for one
//! job is: fetch -> select primary file -> conditional transcode (best
//! effort) -> publish URLs -> QR (best effort) -> final record.

use crate::error::JobError;
use crate::fetch::{Extractor, StreamSelection};
use crate::jobs::{sanitize_title, Job, JobOutcome, JobStatus, DEFAULT_AUDIO_BITRATE};
use crate::qr::{QrGenerator, QR_FILENAME};
use crate::store::{JobStore, META_FILE};
use crate::transcode::Transcoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Extensions recognized as media output, in selection priority order.
/// Audio-focused formats first, then video containers.
const PREFERRED_EXTENSIONS: [&str; 6] = ["mp3", "m4a", "mp4", "webm", "mkv", "opus"];

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers draining `queue`. Workers exit when the channel
    /// is closed and drained.
    pub fn spawn(
        count: usize,
        queue: async_channel::Receiver<String>,
        pipeline: Arc<JobPipeline>,
    ) -> Self {
        let handles = (0..count)
            .map(|worker| {
                let queue = queue.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker, "pipeline worker started");
                    while let Ok(job_id) = queue.recv().await {
                        pipeline.run(&job_id).await;
                    }
                    tracing::debug!(worker, "pipeline worker stopped");
                })
            })
            .collect();

        Self { handles }
    }

    /// Wait for all workers to drain and exit. Close the sending side first.
    pub async fn shutdown(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

pub struct JobPipeline {
    store: JobStore,
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    qr: Arc<dyn QrGenerator>,
    public_url: String,
}

impl JobPipeline {
    pub fn new(
        store: JobStore,
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
        qr: Arc<dyn QrGenerator>,
        public_url: String,
    ) -> Self {
        Self {
            store,
            extractor,
            transcoder,
            qr,
            public_url,
        }
    }

    /// Drive one job to a terminal state, persisting every transition.
    pub async fn run(&self, job_id: &str) {
        let Some(mut job) = self.store.read(job_id) else {
            warn!(job_id, "queued job has no record, skipping");
            return;
        };
        if job.status != JobStatus::Queued {
            warn!(job_id, status = ?job.status, "job already picked up, skipping");
            return;
        }

        job.begin();
        if let Err(e) = self.store.update(&job) {
            error!(job_id, error = %e, "failed to persist processing transition");
            return;
        }
        info!(job_id, url = %job.params.url, "processing job");

        match self.execute(&mut job).await {
            Ok(()) => {
                info!(job_id, filename = ?job.filename, "job finished");
            }
            Err(e) => {
                error!(job_id, error = %e, "job failed");
                job.fail(&e.to_string());
                if let Err(e) = self.store.update(&job) {
                    error!(job_id, error = %e, "failed to persist error state");
                }
            }
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<(), JobError> {
        let dir = self.store.job_dir(&job.job_id);
        let format = job.params.format;

        // 1. Resolve & fetch.
        let selection = if format.is_audio() {
            StreamSelection::BestAudio
        } else {
            StreamSelection::BestVideo
        };
        let info = self
            .extractor
            .fetch(&job.params.url, &dir, selection, job.params.metadata)
            .await
            .map_err(|e| JobError::Extraction(e.to_string()))?;

        // 2. Select the primary file.
        let primary = select_primary_file(&dir)?.ok_or(JobError::NoArtifact)?;
        let title = info.title.clone().unwrap_or_else(|| {
            primary
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| job.job_id.clone())
        });

        // 3. Conditional transcode, degrading to the original on failure.
        let filename = self.transcode_step(job, &dir, &primary, &title).await;

        // 4. Publish URLs.
        let download_url = format!("{}/file/{}/{}", self.public_url, job.job_id, filename);
        let dl_url = format!("{}/dl/{}", self.public_url, job.job_id);

        // 5. Best-effort QR image encoding the stable link.
        let qr_url = match self.qr.generate(&dl_url, &dir.join(QR_FILENAME)) {
            Ok(()) => Some(format!(
                "{}/file/{}/{}",
                self.public_url, job.job_id, QR_FILENAME
            )),
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "qr generation failed");
                None
            }
        };

        // 6. Final record.
        job.complete(JobOutcome {
            title,
            filename,
            is_playlist: info.is_playlist,
            download_url,
            dl_url,
            qr_url,
        });
        self.store
            .update(job)
            .map_err(|e| JobError::Store(e.to_string()))?;

        Ok(())
    }

    /// Transcode the primary file into the target container when it is not
    /// already in it. Returns the name of the final artifact; any adapter
    /// failure keeps the untranscoded file.
    async fn transcode_step(&self, job: &Job, dir: &Path, primary: &Path, title: &str) -> String {
        let format = job.params.format;
        let primary_name = file_name(primary);
        let primary_ext = primary
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        if primary_ext.as_deref() == Some(format.extension()) {
            return primary_name;
        }

        let mut stem = sanitize_title(title);
        if stem.is_empty() {
            stem = job.job_id.clone();
        }
        let output = dir.join(format!("{}.{}", stem, format.extension()));

        let result = if format.is_audio() {
            let bitrate = job
                .params
                .quality
                .trim()
                .parse()
                .unwrap_or(DEFAULT_AUDIO_BITRATE);
            self.transcoder
                .to_audio(primary, &output, bitrate, job.params.normalize)
                .await
        } else {
            self.transcoder.to_video(primary, &output).await
        };

        match result {
            Ok(()) if output.is_file() => file_name(&output),
            Ok(()) => {
                warn!(job_id = %job.job_id, "transcode reported success but produced no output, keeping original");
                primary_name
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "transcode failed, keeping original file");
                primary_name
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pick the primary media file from a job directory: first exact match on the
/// recognized-extension priority list, then the largest file by byte size.
/// The metadata document is never a candidate.
pub fn select_primary_file(dir: &Path) -> Result<Option<PathBuf>, JobError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy() == META_FILE {
            continue;
        }
        files.push((entry.path(), entry.metadata()?.len()));
    }

    for ext in PREFERRED_EXTENSIONS {
        if let Some((path, _)) = files.iter().find(|(path, _)| {
            path.extension()
                .map(|e| e.to_string_lossy().to_lowercase() == ext)
                .unwrap_or(false)
        }) {
            return Ok(Some(path.clone()));
        }
    }

    Ok(files
        .into_iter()
        .max_by_key(|(_, size)| *size)
        .map(|(path, _)| path))
}
