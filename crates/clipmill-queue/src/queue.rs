//! Durable job queue.
//!
//! At-least-once delivery with idempotent submission: each payload
//! carries a deterministic dedupe key, and `enqueue` applies the
//! remove-then-replace policy so re-triggering a unit of work always
//! reflects the newest payload instead of a stale duplicate.
//!
//! The store is an in-process map behind a mutex; the contract
//! (claim/complete/fail, backoff, sweep) is what the worker pool and
//! the stage controllers program against, so an external broker can
//! stand in behind the same surface.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::job::{JobId, JobPayload};
use crate::metrics;
use crate::state::{JobRecord, JobState, JobStatus};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts before a job goes terminally failed.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,
    /// How long completed jobs are retained before the sweep removes them.
    pub completed_retention: Duration,
    /// How long failed jobs are retained (longer, for debugging).
    pub failed_retention: Duration,
    /// Waiting jobs older than this are considered stuck.
    pub stuck_waiting_after: Duration,
    /// Active jobs older than this are considered stuck.
    pub stuck_active_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(30),
            completed_retention: Duration::from_secs(24 * 3600),
            failed_retention: Duration::from_secs(7 * 24 * 3600),
            stuck_waiting_after: Duration::from_secs(6 * 3600),
            stuck_active_after: Duration::from_secs(2 * 3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let secs = |var: &str, default: u64| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        Self {
            max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            backoff_base: Duration::from_secs(secs("QUEUE_BACKOFF_BASE_SECS", 30)),
            completed_retention: Duration::from_secs(secs(
                "QUEUE_COMPLETED_RETENTION_SECS",
                24 * 3600,
            )),
            failed_retention: Duration::from_secs(secs(
                "QUEUE_FAILED_RETENTION_SECS",
                7 * 24 * 3600,
            )),
            stuck_waiting_after: Duration::from_secs(secs("QUEUE_STUCK_WAITING_SECS", 6 * 3600)),
            stuck_active_after: Duration::from_secs(secs("QUEUE_STUCK_ACTIVE_SECS", 2 * 3600)),
        }
    }
}

/// Counts from one garbage-collection sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub completed_removed: usize,
    pub failed_removed: usize,
    pub stuck_waiting_removed: usize,
    pub stuck_active_removed: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.completed_removed
            + self.failed_removed
            + self.stuck_waiting_removed
            + self.stuck_active_removed
    }
}

/// A claimed job handed to a worker.
#[derive(Debug, Clone)]
pub struct JobAttempt<J> {
    pub job_id: JobId,
    pub payload: J,
    /// Attempt number, counting this one (1-based).
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl<J> JobAttempt<J> {
    /// True when no further retry will happen after this attempt.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

/// Durable queue for one payload type.
pub struct DurableQueue<J: JobPayload> {
    config: QueueConfig,
    jobs: Mutex<HashMap<JobId, JobRecord<J>>>,
}

impl<J: JobPayload> DurableQueue<J> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue_name(&self) -> &'static str {
        J::QUEUE_NAME
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a job.
    ///
    /// Dedupe policy: **remove-then-replace**. If a live (waiting,
    /// active or delayed) job already exists for the payload's dedupe
    /// key it is removed first, so the new payload wins. Re-triggering
    /// a render after a configuration change therefore picks up the new
    /// parameters instead of a stale duplicate.
    pub fn enqueue(&self, payload: J) -> JobId {
        let dedupe_key = payload.dedupe_key();
        let now = Utc::now();

        let mut jobs = self.jobs.lock().expect("queue lock poisoned");

        let replaced: Vec<JobId> = jobs
            .values()
            .filter(|r| r.dedupe_key == dedupe_key && r.state.is_live())
            .map(|r| r.id.clone())
            .collect();
        for id in &replaced {
            jobs.remove(id);
        }
        if !replaced.is_empty() {
            info!(
                queue = J::QUEUE_NAME,
                dedupe_key = %dedupe_key,
                replaced = replaced.len(),
                "Replaced live job(s) with same dedupe key"
            );
        }

        let id = JobId::new();
        let record = JobRecord {
            id: id.clone(),
            dedupe_key: dedupe_key.clone(),
            payload,
            state: JobState::Waiting,
            progress: 0,
            attempts_made: 0,
            max_attempts: self.config.max_attempts,
            failed_reason: None,
            created_at: now,
            processed_at: None,
            finished_at: None,
            next_run_at: now,
        };
        jobs.insert(id.clone(), record);
        metrics::record_enqueued(J::QUEUE_NAME);

        debug!(queue = J::QUEUE_NAME, job_id = %id, dedupe_key = %dedupe_key, "Enqueued job");
        id
    }

    /// Status snapshot for a job, if it still exists.
    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        let jobs = self.jobs.lock().expect("queue lock poisoned");
        jobs.get(job_id).map(|r| r.status())
    }

    /// Record a progress hint (0-100). Progress is monotonic: a lower
    /// value than the current one is ignored.
    pub fn report_progress(&self, job_id: &JobId, percent: u8) {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        if let Some(record) = jobs.get_mut(job_id) {
            record.progress = record.progress.max(percent.min(100));
        }
    }

    /// The live job for a dedupe key, if any. Used by submission
    /// surfaces to answer "is this unit of work already in flight".
    pub fn find_live_by_dedupe_key(&self, dedupe_key: &str) -> Option<(JobStatus, J)> {
        let jobs = self.jobs.lock().expect("queue lock poisoned");
        jobs.values()
            .find(|r| r.dedupe_key == dedupe_key && r.state.is_live())
            .map(|r| (r.status(), r.payload.clone()))
    }

    /// Number of live jobs.
    pub fn live_len(&self) -> usize {
        let jobs = self.jobs.lock().expect("queue lock poisoned");
        jobs.values().filter(|r| r.state.is_live()).count()
    }

    /// Claim the oldest due job, marking it active and counting the
    /// attempt. Returns None when nothing is due.
    pub(crate) fn claim_due(&self) -> Option<JobAttempt<J>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");

        let due_id = jobs
            .values()
            .filter(|r| {
                matches!(r.state, JobState::Waiting | JobState::Delayed) && r.next_run_at <= now
            })
            .min_by_key(|r| (r.next_run_at, r.created_at))
            .map(|r| r.id.clone())?;

        let record = jobs.get_mut(&due_id).expect("due job vanished under lock");
        record.state = JobState::Active;
        record.attempts_made += 1;
        if record.processed_at.is_none() {
            record.processed_at = Some(now);
        }

        Some(JobAttempt {
            job_id: record.id.clone(),
            payload: record.payload.clone(),
            attempts_made: record.attempts_made,
            max_attempts: record.max_attempts,
        })
    }

    /// Mark a job completed.
    pub(crate) fn complete(&self, job_id: &JobId) {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        if let Some(record) = jobs.get_mut(job_id) {
            record.state = JobState::Completed;
            record.progress = 100;
            record.finished_at = Some(Utc::now());
            metrics::record_completed(J::QUEUE_NAME);
        }
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures below the attempt limit move the job to
    /// `Delayed` with exponential backoff (`base * 2^(attempts-1)`);
    /// everything else goes terminally `Failed`. Returns the resulting
    /// state.
    pub(crate) fn fail(&self, job_id: &JobId, reason: &str, retryable: bool) -> JobState {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let Some(record) = jobs.get_mut(job_id) else {
            return JobState::Failed;
        };

        record.failed_reason = Some(reason.to_string());

        if retryable && record.attempts_made < record.max_attempts {
            let exponent = record.attempts_made.saturating_sub(1).min(16);
            let delay = self.config.backoff_base * 2u32.pow(exponent);
            record.state = JobState::Delayed;
            record.next_run_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(30));
            metrics::record_retried(J::QUEUE_NAME);
            info!(
                queue = J::QUEUE_NAME,
                job_id = %job_id,
                attempt = record.attempts_made,
                max_attempts = record.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Job failed, scheduling retry"
            );
            JobState::Delayed
        } else {
            record.state = JobState::Failed;
            record.finished_at = Some(Utc::now());
            metrics::record_failed(J::QUEUE_NAME);
            warn!(
                queue = J::QUEUE_NAME,
                job_id = %job_id,
                attempts = record.attempts_made,
                reason = %reason,
                "Job terminally failed"
            );
            JobState::Failed
        }
    }

    /// Garbage-collect terminal and stuck jobs.
    ///
    /// Completed jobs older than the completed-retention window and
    /// failed jobs older than the (longer) failed-retention window are
    /// removed quietly. Waiting/active jobs exceeding the stuck
    /// windows are removed too, but each removal is WARN-logged: that
    /// path is a liveness safeguard and must never hide stuck work
    /// silently.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let mut jobs = self.jobs.lock().expect("queue lock poisoned");
        let mut stats = SweepStats::default();

        let age_exceeds = |since: DateTime<Utc>, window: Duration| {
            now.signed_duration_since(since)
                > chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
        };

        jobs.retain(|id, record| {
            let remove = match record.state {
                JobState::Completed => {
                    let old = record
                        .finished_at
                        .map(|t| age_exceeds(t, self.config.completed_retention))
                        .unwrap_or(false);
                    if old {
                        stats.completed_removed += 1;
                    }
                    old
                }
                JobState::Failed => {
                    let old = record
                        .finished_at
                        .map(|t| age_exceeds(t, self.config.failed_retention))
                        .unwrap_or(false);
                    if old {
                        stats.failed_removed += 1;
                    }
                    old
                }
                JobState::Waiting | JobState::Delayed => {
                    let stuck = age_exceeds(record.created_at, self.config.stuck_waiting_after);
                    if stuck {
                        stats.stuck_waiting_removed += 1;
                        warn!(
                            queue = J::QUEUE_NAME,
                            job_id = %id,
                            dedupe_key = %record.dedupe_key,
                            created_at = %record.created_at,
                            "Removing stuck waiting job"
                        );
                    }
                    stuck
                }
                JobState::Active => {
                    let since = record.processed_at.unwrap_or(record.created_at);
                    let stuck = age_exceeds(since, self.config.stuck_active_after);
                    if stuck {
                        stats.stuck_active_removed += 1;
                        warn!(
                            queue = J::QUEUE_NAME,
                            job_id = %id,
                            dedupe_key = %record.dedupe_key,
                            active_since = %since,
                            "Removing stuck active job"
                        );
                    }
                    stuck
                }
            };
            !remove
        });

        if stats.total() > 0 {
            metrics::record_swept(J::QUEUE_NAME, stats.total());
            info!(
                queue = J::QUEUE_NAME,
                completed = stats.completed_removed,
                failed = stats.failed_removed,
                stuck_waiting = stats.stuck_waiting_removed,
                stuck_active = stats.stuck_active_removed,
                "Queue sweep removed jobs"
            );
        }
        stats
    }
}
