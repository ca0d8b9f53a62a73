//! Pipeline error taxonomy.
//!
//! The retryability split drives the queue: transient external failures
//! go back through retry/backoff, everything else fails the job on the
//! spot. Stage controllers catch at the job boundary only; optional
//! steps swallow and log their own errors instead of surfacing here.

use thiserror::Error;

use clipmill_ledger::LedgerError;
use clipmill_queue::JobError;
use clipmill_store::StoreError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad job parameters. Retrying cannot help.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Ledger rejections (insufficient balance, bad amounts). Fail fast.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Network or provider hiccup in an external call. Retryable.
    #[error("Transient failure during {stage}: {message}")]
    Transient {
        stage: &'static str,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(stage: &'static str, msg: impl Into<String>) -> Self {
        Self::Transient {
            stage,
            message: msg.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transient { .. })
    }
}

impl From<PipelineError> for JobError {
    fn from(err: PipelineError) -> Self {
        if err.is_retryable() {
            JobError::retryable(err.to_string())
        } else {
            JobError::fatal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_split() {
        assert!(PipelineError::transient("download", "connection reset").is_retryable());
        assert!(!PipelineError::validation("empty time range").is_retryable());
        assert!(!PipelineError::from(LedgerError::InsufficientBalance {
            workspace_id: "ws_1".into(),
            requested: 3,
            available: 1,
        })
        .is_retryable());
    }

    #[test]
    fn test_job_error_mapping() {
        let retryable: JobError = PipelineError::transient("render", "engine crashed").into();
        assert!(retryable.retryable);

        let fatal: JobError = PipelineError::validation("bad aspect ratio").into();
        assert!(!fatal.retryable);
    }
}
