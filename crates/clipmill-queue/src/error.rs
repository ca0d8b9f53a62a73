//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn job_not_found(msg: impl Into<String>) -> Self {
        Self::JobNotFound(msg.into())
    }
}
