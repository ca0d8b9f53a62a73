//! Queue metrics.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "clipmill_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "clipmill_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "clipmill_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "clipmill_jobs_retried_total";
    pub const JOBS_SWEPT_TOTAL: &str = "clipmill_jobs_swept_total";
}

/// Record job enqueued.
pub fn record_enqueued(queue: &'static str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "queue" => queue).increment(1);
}

/// Record job completed.
pub fn record_completed(queue: &'static str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "queue" => queue).increment(1);
}

/// Record job failed terminally.
pub fn record_failed(queue: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "queue" => queue).increment(1);
}

/// Record job scheduled for retry.
pub fn record_retried(queue: &'static str) {
    counter!(names::JOBS_RETRIED_TOTAL, "queue" => queue).increment(1);
}

/// Record jobs removed by a GC sweep.
pub fn record_swept(queue: &'static str, count: usize) {
    counter!(names::JOBS_SWEPT_TOTAL, "queue" => queue).increment(count as u64);
}
