//! In-memory store implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use clipmill_models::{
    ClipId, ClipRecord, ClipStatus, SmartCropStatus, TranscriptWord, VideoId, VideoRecord,
    VideoStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::stores::{ClipStore, VideoStore};

/// In-memory video store.
#[derive(Default)]
pub struct MemoryVideoStore {
    videos: Mutex<HashMap<VideoId, VideoRecord>>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: &VideoId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut VideoRecord) -> StoreResult<()>,
    {
        let mut videos = self.videos.lock().await;
        let video = videos
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        f(video)?;
        video.updated_at = Utc::now();
        Ok(())
    }
}

fn check_video_transition(from: VideoStatus, to: VideoStatus) -> StoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::illegal_transition("video", from, to))
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn create(&self, video: VideoRecord) -> StoreResult<()> {
        let mut videos = self.videos.lock().await;
        if videos.contains_key(&video.id) {
            return Err(StoreError::already_exists(video.id.as_str()));
        }
        info!(video_id = %video.id, "Created video record");
        videos.insert(video.id.clone(), video);
        Ok(())
    }

    async fn get(&self, id: &VideoId) -> StoreResult<VideoRecord> {
        let videos = self.videos.lock().await;
        videos
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    async fn transition(&self, id: &VideoId, next: VideoStatus) -> StoreResult<()> {
        self.update(id, |video| {
            check_video_transition(video.status, next)?;
            video.status = next;
            Ok(())
        })
        .await
    }

    async fn set_media(
        &self,
        id: &VideoId,
        source_key: &str,
        audio_key: Option<&str>,
        duration_seconds: u32,
    ) -> StoreResult<()> {
        self.update(id, |video| {
            video.source_key = Some(source_key.to_string());
            video.audio_key = audio_key.map(str::to_string);
            video.duration_seconds = duration_seconds;
            Ok(())
        })
        .await
    }

    async fn set_thumbnail(&self, id: &VideoId, thumbnail_key: &str) -> StoreResult<()> {
        self.update(id, |video| {
            video.thumbnail_key = Some(thumbnail_key.to_string());
            Ok(())
        })
        .await
    }

    async fn set_transcript(
        &self,
        id: &VideoId,
        transcript: &str,
        words: Vec<TranscriptWord>,
        language: Option<String>,
        confidence: Option<f64>,
    ) -> StoreResult<()> {
        self.update(id, |video| {
            video.transcript = Some(transcript.to_string());
            video.transcript_words = words;
            video.language = language;
            video.transcript_confidence = confidence;
            Ok(())
        })
        .await
    }

    async fn complete(&self, id: &VideoId) -> StoreResult<()> {
        self.update(id, |video| {
            check_video_transition(video.status, VideoStatus::Completed)?;
            video.status = VideoStatus::Completed;
            video.completed_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: &VideoId, error: &str) -> StoreResult<()> {
        self.update(id, |video| {
            check_video_transition(video.status, VideoStatus::Failed)?;
            video.status = VideoStatus::Failed;
            video.error_message = Some(error.to_string());
            video.failed_at = Some(Utc::now());
            Ok(())
        })
        .await
    }
}

/// In-memory clip store.
#[derive(Default)]
pub struct MemoryClipStore {
    clips: Mutex<HashMap<ClipId, ClipRecord>>,
}

impl MemoryClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: &ClipId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut ClipRecord) -> StoreResult<()>,
    {
        let mut clips = self.clips.lock().await;
        let clip = clips
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        f(clip)?;
        clip.updated_at = Utc::now();
        Ok(())
    }
}

fn check_clip_transition(from: ClipStatus, to: ClipStatus) -> StoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::illegal_transition("clip", from, to))
    }
}

#[async_trait]
impl ClipStore for MemoryClipStore {
    async fn insert_batch(&self, batch: Vec<ClipRecord>) -> StoreResult<()> {
        let mut clips = self.clips.lock().await;
        for clip in &batch {
            if clips.contains_key(&clip.id) {
                return Err(StoreError::already_exists(clip.id.as_str()));
            }
        }
        info!(count = batch.len(), "Inserting detected clips");
        for clip in batch {
            clips.insert(clip.id.clone(), clip);
        }
        Ok(())
    }

    async fn get(&self, id: &ClipId) -> StoreResult<ClipRecord> {
        let clips = self.clips.lock().await;
        clips
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    async fn list_for_video(&self, video_id: &VideoId) -> StoreResult<Vec<ClipRecord>> {
        let clips = self.clips.lock().await;
        let mut matching: Vec<ClipRecord> = clips
            .values()
            .filter(|c| &c.video_id == video_id)
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.start_time);
        Ok(matching)
    }

    async fn transition(&self, id: &ClipId, next: ClipStatus) -> StoreResult<()> {
        self.update(id, |clip| {
            check_clip_transition(clip.status, next)?;
            clip.status = next;
            Ok(())
        })
        .await
    }

    async fn set_rendered(
        &self,
        id: &ClipId,
        rendered_key: &str,
        raw_key: Option<&str>,
    ) -> StoreResult<()> {
        self.update(id, |clip| {
            clip.rendered_key = Some(rendered_key.to_string());
            if let Some(raw) = raw_key {
                clip.raw_key = Some(raw.to_string());
            }
            Ok(())
        })
        .await
    }

    async fn set_thumbnail(&self, id: &ClipId, thumbnail_key: &str) -> StoreResult<()> {
        self.update(id, |clip| {
            clip.thumbnail_key = Some(thumbnail_key.to_string());
            Ok(())
        })
        .await
    }

    async fn set_smart_crop(
        &self,
        id: &ClipId,
        status: SmartCropStatus,
        key: Option<&str>,
    ) -> StoreResult<()> {
        self.update(id, |clip| {
            clip.smart_crop_status = status;
            if let Some(key) = key {
                clip.smart_crop_key = Some(key.to_string());
            }
            Ok(())
        })
        .await
    }

    async fn fail(&self, id: &ClipId, error: &str) -> StoreResult<()> {
        self.update(id, |clip| {
            check_clip_transition(clip.status, ClipStatus::Failed)?;
            clip.status = ClipStatus::Failed;
            clip.error_message = Some(error.to_string());
            Ok(())
        })
        .await
    }

    async fn all_delivered(&self, video_id: &VideoId) -> StoreResult<bool> {
        let clips = self.clips.lock().await;
        let mut found = false;
        for clip in clips.values().filter(|c| &c.video_id == video_id) {
            if !clip.status.is_delivered() {
                return Ok(false);
            }
            found = true;
        }
        Ok(found)
    }

    async fn delete_for_video(&self, video_id: &VideoId) -> StoreResult<u32> {
        let mut clips = self.clips.lock().await;
        let before = clips.len();
        clips.retain(|_, c| &c.video_id != video_id);
        Ok((before - clips.len()) as u32)
    }
}
