//! Durable job queue for the clipping pipeline.
//!
//! This crate provides:
//! - Typed job payloads with deterministic dedupe keys
//! - An at-least-once queue with retry/backoff and GC sweeps
//! - Worker pools with graceful shutdown
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod metrics;
pub mod progress;
pub mod queue;
pub mod state;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use job::{JobId, JobPayload, ProcessVideoJob, RenderClipJob};
pub use progress::{ProgressChannel, ProgressEvent, ProgressEventKind};
pub use queue::{DurableQueue, JobAttempt, QueueConfig, SweepStats};
pub use state::{JobState, JobStatus};
pub use worker::{
    CleanupTask, JobError, JobHandler, ProgressHandle, WorkerPool, WorkerPoolConfig,
};
