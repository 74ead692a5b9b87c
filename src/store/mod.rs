//! Durable per-job record storage.
//!
//! One directory per job id under the downloads root, each holding a
//! `meta.json` document plus the artifact files. The document is replaced
//! atomically as a whole (write-to-temp-then-rename), so a concurrent reader
//! never observes a torn record, and a process restart recovers all state by
//! re-reading the documents.

use crate::jobs::{Job, JobStatus};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const META_FILE: &str = "meta.json";

/// Job ids are hex tokens; anything else is rejected before it can touch the
/// filesystem.
pub fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 32 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Open the store, creating the downloads root if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create downloads directory: {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Persist the initial record, creating the job's storage directory.
    pub fn create(&self, job: &Job) -> Result<()> {
        let dir = self.job_dir(&job.job_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create job directory: {:?}", dir))?;
        self.write(job)
    }

    /// Replace the record. The job directory must already exist.
    pub fn update(&self, job: &Job) -> Result<()> {
        self.write(job)
    }

    fn write(&self, job: &Job) -> Result<()> {
        let dir = self.job_dir(&job.job_id);
        // Temp file in the job directory itself, so the final rename stays on
        // one filesystem and is atomic.
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp record in {:?}", dir))?;
        serde_json::to_writer_pretty(&mut tmp, job)?;
        tmp.flush()?;
        tmp.persist(dir.join(META_FILE))
            .with_context(|| format!("Failed to persist record for job {}", job.job_id))?;
        Ok(())
    }

    /// Read the current record. Returns `None` for unknown ids, malformed
    /// ids, and undecodable documents alike; polling must never block on a
    /// writer, and the atomic replace guarantees any document we do see is
    /// complete.
    pub fn read(&self, job_id: &str) -> Option<Job> {
        if !is_valid_job_id(job_id) {
            return None;
        }
        let path = self.job_dir(job_id).join(META_FILE);
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Startup sweep: any record left non-terminal by a previous process is
    /// moved to `error`, since its worker no longer exists. Returns how many
    /// records were transitioned.
    pub fn recover(&self) -> Result<usize> {
        let mut recovered = 0;

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(job_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(mut job) = self.read(&job_id) else {
                continue;
            };
            if job.status.is_terminal() {
                continue;
            }

            job.fail("interrupted by server restart");
            if let Err(e) = self.update(&job) {
                tracing::warn!(job_id = %job_id, error = %e, "failed to mark interrupted job");
                continue;
            }
            recovered += 1;
        }

        Ok(recovered)
    }
}
