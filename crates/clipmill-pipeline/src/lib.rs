//! Asynchronous video clipping pipeline.
//!
//! Two stage controllers driven by durable queues:
//! - Ingestion: acquire source media, transcribe, detect viral
//!   segments and fan out one render job per clip
//! - Render: bill, render, smart-crop and deliver a single clip
//!
//! [`PipelineService`] owns the queues, worker pools and cleanup tasks
//! and exposes the submission surface.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod metrics;
pub mod render;
pub mod service;
pub mod services;
pub mod telemetry;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use ingestion::{IngestionDeps, IngestionStage};
pub use render::{RenderDeps, RenderStage};
pub use service::{
    Collaborators, PipelineService, SubmitVideoRequest, VideoSubmission,
};
pub use services::{
    CaptionTranslator, CropDirective, CropPlan, FetchedSource, MemorySettingsProvider, Notifier,
    ObjectStorage, ProgressReporter, ReframeDetector, ReframeOutput, RenderEngine, RenderOutput,
    RenderRequest, SegmentCandidate, SegmentConstraints, SegmentDetector, SettingsProvider,
    SourceFetcher, ThumbnailOutput, Transcriber, Transcription,
};
