//! Typed job payloads for the pipeline queues.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use clipmill_models::{
    AspectRatio, CaptionStyle, CaptionWord, ClipId, RenderQuality, SourceType, VideoId,
};

/// Unique identifier for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload type bound to one queue.
///
/// The dedupe key is the deterministic identity of the logical unit of
/// work; it is what makes re-submission idempotent.
pub trait JobPayload:
    Serialize + DeserializeOwned + Clone + Send + Sync + fmt::Debug + 'static
{
    /// Queue name, used for logging and metric labels.
    const QUEUE_NAME: &'static str;

    /// Deterministic job identity (e.g. `video-{id}`, `clip-{id}`).
    fn dedupe_key(&self) -> String;
}

/// Job to ingest a video: download/upload, transcribe, detect segments
/// and fan out one render job per detected clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessVideoJob {
    pub video_id: VideoId,
    pub workspace_id: String,
    pub user_id: String,
    pub source_type: SourceType,
    /// External URL or storage key, depending on `source_type`.
    pub source_reference: String,
    pub created_at: DateTime<Utc>,
}

impl ProcessVideoJob {
    pub fn new(
        video_id: VideoId,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        source_type: SourceType,
        source_reference: impl Into<String>,
    ) -> Self {
        Self {
            video_id,
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            source_type,
            source_reference: source_reference.into(),
            created_at: Utc::now(),
        }
    }
}

impl JobPayload for ProcessVideoJob {
    const QUEUE_NAME: &'static str = "ingest";

    fn dedupe_key(&self) -> String {
        format!("video-{}", self.video_id)
    }
}

/// Job to render a single detected clip.
///
/// Optional features (watermark, intro title, emoji transcript,
/// translation, split screen, smart crop) are independent fields; each
/// is an individually-failable sub-step of the render stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderClipJob {
    pub clip_id: ClipId,
    pub video_id: VideoId,
    pub workspace_id: String,
    pub user_id: String,

    /// Clip start, seconds from video start.
    pub start_time: u32,
    /// Clip end, seconds from video start.
    pub end_time: u32,

    pub aspect_ratio: AspectRatio,
    pub quality: RenderQuality,

    /// Credits debited for this render. Zero disables billing.
    #[serde(default)]
    pub credit_cost: u32,

    /// Clip-relative caption words; None renders without captions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions: Option<Vec<CaptionWord>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_style: Option<CaptionStyle>,

    #[serde(default)]
    pub watermark: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro_title: Option<String>,

    /// Emoji-annotated transcript text overlaid on the clip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji_transcript: Option<String>,

    /// Target caption translation language (BCP 47 tag).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    /// Storage key of a split-screen background video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_screen: Option<String>,

    #[serde(default)]
    pub smart_crop_enabled: bool,

    pub created_at: DateTime<Utc>,
}

impl RenderClipJob {
    pub fn new(
        clip_id: ClipId,
        video_id: VideoId,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        start_time: u32,
        end_time: u32,
    ) -> Self {
        Self {
            clip_id,
            video_id,
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            start_time,
            end_time,
            aspect_ratio: AspectRatio::default(),
            quality: RenderQuality::default(),
            credit_cost: 0,
            captions: None,
            caption_style: None,
            watermark: false,
            intro_title: None,
            emoji_transcript: None,
            target_language: None,
            split_screen: None,
            smart_crop_enabled: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_credit_cost(mut self, cost: u32) -> Self {
        self.credit_cost = cost;
        self
    }

    pub fn with_captions(mut self, words: Vec<CaptionWord>, style: CaptionStyle) -> Self {
        self.captions = Some(words);
        self.caption_style = Some(style);
        self
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_smart_crop(mut self, enabled: bool) -> Self {
        self.smart_crop_enabled = enabled;
        self
    }
}

impl JobPayload for RenderClipJob {
    const QUEUE_NAME: &'static str = "render";

    fn dedupe_key(&self) -> String {
        format!("clip-{}", self.clip_id)
    }
}
