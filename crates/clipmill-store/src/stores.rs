//! Persistence traits for videos and clips.
//!
//! Implementations enforce the status state machines: every status
//! change goes through `transition` (or a helper that delegates to it),
//! and an illegal move is rejected rather than silently applied.

use async_trait::async_trait;

use clipmill_models::{
    ClipId, ClipRecord, ClipStatus, SmartCropStatus, TranscriptWord, VideoId, VideoRecord,
    VideoStatus,
};

use crate::error::StoreResult;

/// Repository for video records.
#[async_trait]
pub trait VideoStore: Send + Sync + 'static {
    /// Insert a new video record.
    async fn create(&self, video: VideoRecord) -> StoreResult<()>;

    /// Get a video by ID.
    async fn get(&self, id: &VideoId) -> StoreResult<VideoRecord>;

    /// Move the video to `next`, rejecting illegal transitions.
    async fn transition(&self, id: &VideoId, next: VideoStatus) -> StoreResult<()>;

    /// Record the stored source media and its duration.
    async fn set_media(
        &self,
        id: &VideoId,
        source_key: &str,
        audio_key: Option<&str>,
        duration_seconds: u32,
    ) -> StoreResult<()>;

    /// Record the video thumbnail.
    async fn set_thumbnail(&self, id: &VideoId, thumbnail_key: &str) -> StoreResult<()>;

    /// Record transcription output.
    async fn set_transcript(
        &self,
        id: &VideoId,
        transcript: &str,
        words: Vec<TranscriptWord>,
        language: Option<String>,
        confidence: Option<f64>,
    ) -> StoreResult<()>;

    /// Mark the video completed (must be a legal transition).
    async fn complete(&self, id: &VideoId) -> StoreResult<()>;

    /// Mark the video failed with an error message. Rejected once the
    /// video is already terminal.
    async fn fail(&self, id: &VideoId, error: &str) -> StoreResult<()>;
}

/// Repository for clip records.
#[async_trait]
pub trait ClipStore: Send + Sync + 'static {
    /// Insert a batch of freshly detected clips.
    async fn insert_batch(&self, clips: Vec<ClipRecord>) -> StoreResult<()>;

    /// Get a clip by ID.
    async fn get(&self, id: &ClipId) -> StoreResult<ClipRecord>;

    /// All clips belonging to a video.
    async fn list_for_video(&self, video_id: &VideoId) -> StoreResult<Vec<ClipRecord>>;

    /// Move the clip to `next`, rejecting illegal transitions.
    async fn transition(&self, id: &ClipId, next: ClipStatus) -> StoreResult<()>;

    /// Record render output keys.
    async fn set_rendered(
        &self,
        id: &ClipId,
        rendered_key: &str,
        raw_key: Option<&str>,
    ) -> StoreResult<()>;

    /// Record the clip thumbnail.
    async fn set_thumbnail(&self, id: &ClipId, thumbnail_key: &str) -> StoreResult<()>;

    /// Update the smart-crop sub-status and, when finished, its output
    /// key. Never touches the clip's own status.
    async fn set_smart_crop(
        &self,
        id: &ClipId,
        status: SmartCropStatus,
        key: Option<&str>,
    ) -> StoreResult<()>;

    /// Mark the clip failed with an error message.
    async fn fail(&self, id: &ClipId, error: &str) -> StoreResult<()>;

    /// Whether every clip of the video is delivered (ready or
    /// exported). False when the video has no clips at all.
    async fn all_delivered(&self, video_id: &VideoId) -> StoreResult<bool>;

    /// Remove all clips of a video. Returns how many were removed.
    async fn delete_for_video(&self, video_id: &VideoId) -> StoreResult<u32>;
}
