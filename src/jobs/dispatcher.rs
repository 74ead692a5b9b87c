//! Job dispatcher: allocates ids, persists the initial record, and hands the
//! job to the worker pool without waiting for completion.

use crate::error::ApiError;
use crate::jobs::{new_job_id, Job, JobParams};
use crate::store::JobStore;

pub struct Dispatcher {
    store: JobStore,
    queue: async_channel::Sender<String>,
}

impl Dispatcher {
    pub fn new(store: JobStore, queue: async_channel::Sender<String>) -> Self {
        Self { store, queue }
    }

    /// Create a job for the given request and enqueue it. Returns as soon as
    /// the initial record is durably created; the eventual pipeline outcome
    /// never surfaces here.
    pub async fn submit(&self, params: JobParams) -> Result<String, ApiError> {
        if params.url.trim().is_empty() {
            return Err(ApiError::BadRequest("Missing url parameter".to_string()));
        }

        let job = Job::new(new_job_id(), params);
        let job_id = job.job_id.clone();

        self.store
            .create(&job)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        // Bounded queue: a full queue applies backpressure to submission
        // instead of spawning unbounded workers. Send only errors when the
        // channel is closed, which happens during shutdown.
        self.queue
            .send(job_id.clone())
            .await
            .map_err(|_| ApiError::Internal("job queue is shut down".to_string()))?;

        tracing::info!(job_id = %job_id, url = %job.params.url, "job queued");
        Ok(job_id)
    }
}
