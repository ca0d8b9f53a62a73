//! Worker pools and the periodic cleanup task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::job::{JobId, JobPayload};
use crate::progress::ProgressChannel;
use crate::queue::{DurableQueue, JobAttempt};
use crate::state::JobState;

/// Error returned by a job handler.
///
/// `retryable` decides whether the queue schedules another attempt or
/// fails the job terminally right away (validation and balance errors
/// gain nothing from a retry).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            retryable: false,
        }
    }
}

/// Progress reporting handle scoped to one job.
pub struct ProgressHandle<J: JobPayload> {
    queue: Arc<DurableQueue<J>>,
    job_id: JobId,
    channel: Option<Arc<ProgressChannel>>,
}

impl<J: JobPayload> Clone for ProgressHandle<J> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            job_id: self.job_id.clone(),
            channel: self.channel.clone(),
        }
    }
}

impl<J: JobPayload> ProgressHandle<J> {
    pub fn new(
        queue: Arc<DurableQueue<J>>,
        job_id: JobId,
        channel: Option<Arc<ProgressChannel>>,
    ) -> Self {
        Self {
            queue,
            job_id,
            channel,
        }
    }

    /// Report progress (0-100). The queue keeps it monotonic; the
    /// broadcast is best-effort.
    pub async fn report(&self, percent: u8) {
        self.queue.report_progress(&self.job_id, percent);
        if let Some(channel) = &self.channel {
            channel.progress(&self.job_id, percent).await.ok();
        }
    }

    /// Queue-side progress update only, callable from sync callbacks
    /// (e.g. a render engine's progress hook). Skips the broadcast.
    pub fn report_sync(&self, percent: u8) {
        self.queue.report_progress(&self.job_id, percent);
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// Handler executed for each claimed job.
#[async_trait]
pub trait JobHandler<J: JobPayload>: Send + Sync + 'static {
    async fn handle(
        &self,
        attempt: &JobAttempt<J>,
        progress: &ProgressHandle<J>,
    ) -> Result<(), JobError>;
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers. A per-pool setting, not a queue
    /// property: stages contending over a shared CPU-bound tool run
    /// fewer workers than I/O-bound stages.
    pub concurrency: usize,
    /// Idle poll interval when no job is due.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A pool of N worker tasks serving one queue.
pub struct WorkerPool {
    shutdown: tokio::sync::watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    queue_name: &'static str,
}

impl WorkerPool {
    /// Start the pool. Each worker loops: claim the next due job, run
    /// the handler, and report the outcome to the queue. A job occupies
    /// its worker slot for its full duration.
    pub fn start<J, H>(
        queue: Arc<DurableQueue<J>>,
        handler: Arc<H>,
        config: WorkerPoolConfig,
        channel: Option<Arc<ProgressChannel>>,
    ) -> Self
    where
        J: JobPayload,
        H: JobHandler<J>,
    {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let mut handles = Vec::with_capacity(config.concurrency);

        info!(
            queue = J::QUEUE_NAME,
            concurrency = config.concurrency,
            "Starting worker pool"
        );

        for worker_idx in 0..config.concurrency {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let channel = channel.clone();
            let mut shutdown_rx = shutdown.subscribe();
            let poll_interval = config.poll_interval;

            handles.push(tokio::spawn(async move {
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }

                    let Some(attempt) = queue.claim_due() else {
                        tokio::select! {
                            _ = shutdown_rx.changed() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                        continue;
                    };

                    debug!(
                        queue = J::QUEUE_NAME,
                        worker = worker_idx,
                        job_id = %attempt.job_id,
                        attempt = attempt.attempts_made,
                        "Executing job"
                    );

                    let progress = ProgressHandle {
                        queue: Arc::clone(&queue),
                        job_id: attempt.job_id.clone(),
                        channel: channel.clone(),
                    };

                    match handler.handle(&attempt, &progress).await {
                        Ok(()) => {
                            queue.complete(&attempt.job_id);
                            if let Some(ch) = &channel {
                                ch.done(&attempt.job_id).await.ok();
                            }
                        }
                        Err(e) => {
                            let state = queue.fail(&attempt.job_id, &e.message, e.retryable);
                            if state == JobState::Failed {
                                if let Some(ch) = &channel {
                                    ch.error(&attempt.job_id, &e.message).await.ok();
                                }
                            }
                        }
                    }
                }
                debug!(queue = J::QUEUE_NAME, worker = worker_idx, "Worker stopped");
            }));
        }

        Self {
            shutdown,
            handles,
            queue_name: J::QUEUE_NAME,
        }
    }

    /// Signal shutdown and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        info!(queue = self.queue_name, "Stopping worker pool");
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(queue = self.queue_name, "Worker task panicked: {}", e);
            }
        }
        info!(queue = self.queue_name, "Worker pool stopped");
    }
}

/// Periodic garbage-collection task for one queue.
///
/// Started and stopped explicitly as part of process lifecycle, never
/// as an import side effect.
pub struct CleanupTask {
    shutdown: tokio::sync::watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    pub fn start<J: JobPayload>(queue: Arc<DurableQueue<J>>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = tokio::sync::watch::channel(false);

        info!(queue = J::QUEUE_NAME, interval_secs = interval.as_secs(), "Starting cleanup task");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh
            // process does not sweep before any work exists.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        queue.sweep(chrono::Utc::now());
                    }
                }
            }
            debug!(queue = J::QUEUE_NAME, "Cleanup task stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the sweep loop.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.await.ok();
    }
}
