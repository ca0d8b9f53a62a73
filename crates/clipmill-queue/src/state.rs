//! Job state and status views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobId;

/// Queue-side job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Eligible to be claimed by a worker.
    Waiting,
    /// Claimed and executing.
    Active,
    /// Finished successfully (terminal).
    Completed,
    /// Exhausted retries or failed fatally (terminal).
    Failed,
    /// Waiting out a retry backoff delay.
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Live jobs participate in dedupe-key identity.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Internal queue record for one job.
#[derive(Debug, Clone)]
pub(crate) struct JobRecord<J> {
    pub id: JobId,
    pub dedupe_key: String,
    pub payload: J,
    pub state: JobState,
    /// Monotonic progress hint (0-100).
    pub progress: u8,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// First claim time.
    pub processed_at: Option<DateTime<Utc>>,
    /// Terminal transition time.
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest time a waiting/delayed job may be claimed.
    pub next_run_at: DateTime<Utc>,
}

/// Status snapshot consumed by polling collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub attempts_made: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<Utc>>,
}

impl<J> JobRecord<J> {
    pub(crate) fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            state: self.state,
            progress: self.progress,
            attempts_made: self.attempts_made,
            failed_reason: self.failed_reason.clone(),
            created_at: self.created_at,
            processed_on: self.processed_at,
            finished_on: self.finished_at,
        }
    }
}
