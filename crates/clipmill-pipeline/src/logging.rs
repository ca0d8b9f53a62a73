//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for stage controllers with
//! automatic contextual information (job ID, stage name).

use tracing::{error, info, warn};

use clipmill_queue::JobId;

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: &'static str,
}

impl JobLogger {
    /// Create a new job logger for a specific job and stage.
    pub fn new(job_id: &JobId, stage: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage,
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = self.stage,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = self.stage,
            "Job progress: {}", message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            stage = self.stage,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            stage = self.stage,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = self.stage,
            "Job completed: {}", message
        );
    }
}
