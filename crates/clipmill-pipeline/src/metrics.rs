//! Pipeline processing metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const VIDEOS_COMPLETED_TOTAL: &str = "clipmill_videos_completed_total";
    pub const VIDEOS_FAILED_TOTAL: &str = "clipmill_videos_failed_total";
    pub const CLIPS_DETECTED_TOTAL: &str = "clipmill_clips_detected_total";
    pub const CLIPS_RENDERED_TOTAL: &str = "clipmill_clips_rendered_total";
    pub const CLIPS_FAILED_TOTAL: &str = "clipmill_clips_failed_total";
    pub const RENDER_DURATION_SECONDS: &str = "clipmill_render_duration_seconds";
}

pub fn record_video_completed() {
    counter!(names::VIDEOS_COMPLETED_TOTAL).increment(1);
}

pub fn record_video_failed() {
    counter!(names::VIDEOS_FAILED_TOTAL).increment(1);
}

pub fn record_clips_detected(count: usize) {
    counter!(names::CLIPS_DETECTED_TOTAL).increment(count as u64);
}

pub fn record_clip_rendered(duration_secs: f64) {
    counter!(names::CLIPS_RENDERED_TOTAL).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS).record(duration_secs);
}

pub fn record_clip_failed() {
    counter!(names::CLIPS_FAILED_TOTAL).increment(1);
}
