//! Collaborator boundary contracts.
//!
//! Everything the pipeline needs from the outside world crosses one of
//! these traits: media acquisition, object storage, transcription,
//! segment detection, rendering, reframe planning, caption translation
//! and notifications. Controllers receive them as constructed services,
//! never as module-level singletons.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use clipmill_models::{
    AspectRatio, CaptionStyle, CaptionWord, ClipId, ClippingSettings, RenderQuality, SourceType,
    TranscriptWord, VideoId,
};

use crate::error::PipelineResult;

/// Source media stored by a fetcher.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    /// Storage key of the stored source media.
    pub source_key: String,
    /// Storage key of the extracted audio track, when produced.
    pub audio_key: Option<String>,
    /// Source duration in seconds.
    pub duration_seconds: u32,
}

/// Acquires source media (external URL or previously uploaded object)
/// and streams it into durable storage under the given prefix.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        source_type: SourceType,
        source_reference: &str,
        dest_prefix: &str,
    ) -> PipelineResult<FetchedSource>;
}

/// Object storage boundary. Fetchers and the render engine stream
/// their large outputs through `put`; the controllers themselves only
/// sign and delete.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an object, returning its URL.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> PipelineResult<String>;

    async fn signed_url(&self, key: &str, ttl: Duration) -> PipelineResult<String>;

    async fn delete(&self, key: &str) -> PipelineResult<()>;
}

/// Transcription output.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub words: Vec<TranscriptWord>,
    pub language: Option<String>,
    pub confidence: Option<f64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe<'a>(
        &self,
        audio_url: &str,
        language_hint: Option<&'a str>,
    ) -> PipelineResult<Transcription>;
}

/// Constraints passed to segment detection.
#[derive(Debug, Clone)]
pub struct SegmentConstraints {
    pub min_duration: u32,
    pub max_duration: u32,
    pub max_clips: u32,
    pub genre: Option<String>,
}

/// A candidate viral segment returned by detection.
#[derive(Debug, Clone)]
pub struct SegmentCandidate {
    pub title: String,
    pub start_time: u32,
    pub end_time: u32,
    pub score: f64,
    pub hooks: Vec<String>,
    pub emotions: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SegmentDetector: Send + Sync {
    async fn detect(
        &self,
        transcript: &str,
        words: &[TranscriptWord],
        constraints: &SegmentConstraints,
    ) -> PipelineResult<Vec<SegmentCandidate>>;
}

/// Progress callback handed to the render engine. Engines report
/// 0-100 for their own work; the caller owns any scaling.
pub struct ProgressReporter {
    f: Box<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: u8) {
        (self.f)(percent.min(100));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressReporter")
    }
}

/// Parameters for one clip render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source_key: String,
    pub start_time: u32,
    pub end_time: u32,
    pub aspect_ratio: AspectRatio,
    pub quality: RenderQuality,
    pub captions: Option<Vec<CaptionWord>>,
    pub caption_style: Option<CaptionStyle>,
    pub watermark: bool,
    pub intro_title: Option<String>,
    pub emoji_transcript: Option<String>,
    pub split_screen_key: Option<String>,
    /// Storage prefix for the produced objects.
    pub dest_prefix: String,
}

/// Output of a successful render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Finished, captioned output.
    pub rendered_key: String,
    /// Caption-free output, input to the reframing sub-pipeline.
    pub raw_key: String,
    pub file_size: u64,
}

/// A crop/split plan produced by reframe detection.
#[derive(Debug, Clone, Default)]
pub struct CropPlan {
    pub directives: Vec<CropDirective>,
}

impl CropPlan {
    /// An empty plan means the footage needs no reframing.
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// One time-windowed crop directive.
#[derive(Debug, Clone)]
pub struct CropDirective {
    pub start: f64,
    pub end: f64,
    /// Horizontal crop center, 0.0 = left edge, 1.0 = right edge.
    pub center_x: f64,
}

#[derive(Debug, Clone)]
pub struct ReframeOutput {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ThumbnailOutput {
    pub key: String,
    pub url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render(
        &self,
        request: &RenderRequest,
        progress: &ProgressReporter,
    ) -> PipelineResult<RenderOutput>;

    async fn reframe(
        &self,
        raw_url: &str,
        plan: &CropPlan,
        dest_prefix: &str,
    ) -> PipelineResult<ReframeOutput>;

    async fn thumbnail(&self, source_key: &str) -> PipelineResult<ThumbnailOutput>;
}

/// Produces a crop/split plan from caption-free footage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReframeDetector: Send + Sync {
    async fn plan(&self, raw_url: &str) -> PipelineResult<CropPlan>;
}

/// Pre-translated captions lookup. `Ok(None)` means no translation is
/// available; the render stage falls back to the original captions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionTranslator: Send + Sync {
    async fn translated_captions(
        &self,
        clip_id: &ClipId,
        language: &str,
    ) -> PipelineResult<Option<Vec<CaptionWord>>>;
}

/// Fire-and-forget notifications. Callers log failures and move on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        event: &str,
        recipient: &str,
        data: serde_json::Value,
    ) -> PipelineResult<()>;
}

/// Per-video settings chosen at submission time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings_for(&self, video_id: &VideoId) -> PipelineResult<Option<ClippingSettings>>;
}

/// In-memory settings provider backing the submission surface.
#[derive(Default)]
pub struct MemorySettingsProvider {
    inner: Mutex<HashMap<VideoId, ClippingSettings>>,
}

impl MemorySettingsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, video_id: VideoId, settings: ClippingSettings) {
        self.inner.lock().await.insert(video_id, settings);
    }
}

#[async_trait]
impl SettingsProvider for MemorySettingsProvider {
    async fn settings_for(&self, video_id: &VideoId) -> PipelineResult<Option<ClippingSettings>> {
        Ok(self.inner.lock().await.get(video_id).cloned())
    }
}
