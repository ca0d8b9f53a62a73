//! Per-video clipping settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::caption::CaptionTemplate;
use crate::style::{AspectRatio, RenderQuality};

fn default_min_duration() -> u32 {
    15
}

fn default_max_duration() -> u32 {
    90
}

fn default_max_clips() -> u32 {
    10
}

/// Configuration applied to a single video's processing run.
///
/// Defaults apply when the submitting surface provides nothing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClippingSettings {
    /// Minimum clip duration in seconds.
    #[serde(default = "default_min_duration")]
    pub min_duration: u32,

    /// Maximum clip duration in seconds.
    #[serde(default = "default_max_duration")]
    pub max_duration: u32,

    /// Maximum number of clips persisted per video.
    #[serde(default = "default_max_clips")]
    pub max_clips: u32,

    /// Content genre hint forwarded to detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,

    #[serde(default)]
    pub caption_template: CaptionTemplate,

    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    #[serde(default)]
    pub quality: RenderQuality,

    /// Restrict detection to `[timeframe_start, timeframe_end]`
    /// (seconds from video start). None = whole video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe_start: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe_end: Option<f64>,

    /// Transcribe only; produce no clips.
    #[serde(default)]
    pub skip_clipping: bool,

    /// Render a watermark (plan-dependent, decided at submission).
    #[serde(default)]
    pub watermark: bool,

    /// Credits debited per rendered clip. Zero disables per-clip billing.
    #[serde(default)]
    pub credit_cost_per_clip: u32,

    /// Language hint forwarded to transcription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,

    /// Target caption translation language for rendered clips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    /// Enable the non-fatal smart-crop (reframing) sub-pipeline.
    #[serde(default)]
    pub smart_crop_enabled: bool,

    /// Intro title text overlaid at clip start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro_title: Option<String>,

    /// Annotate captions with emojis.
    #[serde(default)]
    pub emoji_transcript: bool,

    /// Storage key of a split-screen background video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_screen_key: Option<String>,
}

impl Default for ClippingSettings {
    fn default() -> Self {
        Self {
            min_duration: default_min_duration(),
            max_duration: default_max_duration(),
            max_clips: default_max_clips(),
            genre: None,
            caption_template: CaptionTemplate::default(),
            aspect_ratio: AspectRatio::default(),
            quality: RenderQuality::default(),
            timeframe_start: None,
            timeframe_end: None,
            skip_clipping: false,
            watermark: false,
            credit_cost_per_clip: 0,
            language_hint: None,
            target_language: None,
            smart_crop_enabled: false,
            intro_title: None,
            emoji_transcript: false,
            split_screen_key: None,
        }
    }
}

impl ClippingSettings {
    /// Duration bounds are usable only when `min < max`.
    pub fn duration_bounds_valid(&self) -> bool {
        self.min_duration < self.max_duration
    }

    /// The effective timeframe window, defaulting to the whole video.
    pub fn timeframe(&self, video_duration: f64) -> (f64, f64) {
        let start = self.timeframe_start.unwrap_or(0.0).max(0.0);
        let end = self.timeframe_end.unwrap_or(video_duration).min(video_duration);
        (start, end)
    }
}
