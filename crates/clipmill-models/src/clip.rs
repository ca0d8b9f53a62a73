//! Viral clip entity and its status state machines.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::video::VideoId;

/// Unique identifier for a viral clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    /// Generate a new random clip ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClipId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Clip rendering status.
///
/// `detected -> generating -> {ready | failed}`; `ready -> exported`
/// is driven by the external export surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    #[default]
    Detected,
    Generating,
    Ready,
    Exported,
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Detected => "detected",
            ClipStatus::Generating => "generating",
            ClipStatus::Ready => "ready",
            ClipStatus::Exported => "exported",
            ClipStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClipStatus::Ready | ClipStatus::Exported | ClipStatus::Failed)
    }

    /// Ready and Exported both count as delivered for the
    /// all-clips-ready check.
    pub fn is_delivered(&self) -> bool {
        matches!(self, ClipStatus::Ready | ClipStatus::Exported)
    }

    pub fn can_transition_to(&self, next: ClipStatus) -> bool {
        use ClipStatus::*;
        match (self, next) {
            (Detected, Generating) => true,
            (Generating, Ready) => true,
            (Generating, Failed) => true,
            (Detected, Failed) => true,
            (Ready, Exported) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Smart-crop (reframing) sub-pipeline status.
///
/// Independent of `ClipStatus`: a smart-crop failure never forces the
/// parent clip to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmartCropStatus {
    #[default]
    None,
    Pending,
    Processing,
    Done,
    Skipped,
    Failed,
}

impl SmartCropStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartCropStatus::None => "none",
            SmartCropStatus::Pending => "pending",
            SmartCropStatus::Processing => "processing",
            SmartCropStatus::Done => "done",
            SmartCropStatus::Skipped => "skipped",
            SmartCropStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SmartCropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected viral clip, persisted by the ingestion stage and mutated
/// by the render stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipRecord {
    pub id: ClipId,
    pub video_id: VideoId,
    pub workspace_id: String,

    #[serde(default)]
    pub status: ClipStatus,

    /// Clip start, seconds from video start.
    pub start_time: u32,
    /// Clip end, seconds from video start.
    pub end_time: u32,
    /// `end_time - start_time`.
    pub duration: u32,

    /// Segment title suggested by detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Clip transcript text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Virality score from detection.
    #[serde(default)]
    pub score: f64,

    /// Hook categories attached by detection.
    #[serde(default)]
    pub hooks: Vec<String>,

    /// Emotion labels attached by detection.
    #[serde(default)]
    pub emotions: Vec<String>,

    /// Storage key of the finished (captioned) render.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_key: Option<String>,

    /// Storage key of the caption-free raw render.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_key: Option<String>,

    /// Storage key of the clip thumbnail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,

    #[serde(default)]
    pub smart_crop_status: SmartCropStatus,

    /// Storage key of the reframed output, when smart crop succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smart_crop_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClipRecord {
    /// Create a new detected clip.
    pub fn new(
        video_id: VideoId,
        workspace_id: impl Into<String>,
        start_time: u32,
        end_time: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ClipId::new(),
            video_id,
            workspace_id: workspace_id.into(),
            status: ClipStatus::Detected,
            start_time,
            end_time,
            duration: end_time.saturating_sub(start_time),
            title: None,
            transcript: None,
            score: 0.0,
            hooks: Vec::new(),
            emotions: Vec::new(),
            rendered_key: None,
            raw_key: None,
            thumbnail_key: None,
            smart_crop_status: SmartCropStatus::None,
            smart_crop_key: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_hooks(mut self, hooks: Vec<String>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_emotions(mut self, emotions: Vec<String>) -> Self {
        self.emotions = emotions;
        self
    }
}
