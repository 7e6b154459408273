// SPDX-License-Identifier: GPL-3.0-or-later

//! Bounded-concurrency work queue for tagging jobs.
//!
//! Each job runs on its own task with a child of the queue's cancellation
//! token, so one job can be cancelled alone and [`TaggingQueue::cancel_all`]
//! reaches every job, queued or running.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tubetag_config::QueueConfig;
use tubetag_domain::VideoInfo;

use crate::tagging::{TaggingError, TaggingOutcome, TaggingRequest, TaggingService};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("tagging failed: {0}")]
    Tagging(#[from] TaggingError),
    #[error("tagging task failed: {0}")]
    Join(#[from] JoinError),
}

impl QueueError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Tagging(TaggingError::Cancelled))
    }
}

#[derive(Debug, Clone)]
pub enum TaggingJob {
    Inject(TaggingRequest),
    Reset { path: PathBuf, video: VideoInfo },
}

impl TaggingJob {
    pub fn path(&self) -> &PathBuf {
        match self {
            TaggingJob::Inject(request) => &request.path,
            TaggingJob::Reset { path, .. } => path,
        }
    }
}

/// A submitted job.
pub struct JobHandle {
    path: PathBuf,
    cancel: CancellationToken,
    handle: JoinHandle<Result<TaggingOutcome, TaggingError>>,
}

impl JobHandle {
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Cancel this job only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<TaggingOutcome, QueueError> {
        Ok(self.handle.await??)
    }
}

pub struct TaggingQueue {
    service: Arc<TaggingService>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl TaggingQueue {
    pub fn new(service: Arc<TaggingService>, config: &QueueConfig) -> Self {
        let max_concurrent = config.effective_concurrency();
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            cancel: CancellationToken::new(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Token cancelled by [`cancel_all`](Self::cancel_all); useful for wiring Ctrl-C.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel_all(&self) {
        info!(target: "queue", "cancelling all tagging jobs");
        self.cancel.cancel();
    }

    /// Start a job; it waits for a free slot before doing any work.
    pub fn submit(&self, job: TaggingJob) -> JobHandle {
        let cancel = self.cancel.child_token();
        let path = job.path().clone();
        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.permits);
        let job_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = job_cancel.cancelled() => return Err(TaggingError::Cancelled),
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // The semaphore is never closed while the queue is alive.
                    Err(_) => return Err(TaggingError::Cancelled),
                },
            };

            debug!(target: "queue", path = %job.path().display(), "job started");
            let result = match &job {
                TaggingJob::Inject(request) => service.inject_tags(request, &job_cancel).await,
                TaggingJob::Reset { path, video } => service.reset_tags(path, video, &job_cancel).await,
            };
            match &result {
                Ok(outcome) => debug!(
                    target: "queue",
                    path = %outcome.path.display(),
                    successful = outcome.is_successful(),
                    "job finished"
                ),
                Err(TaggingError::Cancelled) => debug!(target: "queue", path = %job.path().display(), "job cancelled"),
                Err(error) => warn!(target: "queue", path = %job.path().display(), %error, "job failed"),
            }
            result
        });

        JobHandle { path, cancel, handle }
    }

    /// Submit every job and wait for all of them. Results keep submission order.
    pub async fn run_all(&self, jobs: Vec<TaggingJob>) -> Vec<Result<TaggingOutcome, QueueError>> {
        info!(target: "queue", jobs = jobs.len(), max_concurrent = self.max_concurrent, "running tagging jobs");
        let handles: Vec<JobHandle> = jobs.into_iter().map(|job| self.submit(job)).collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.join().await);
        }
        results
    }
}
