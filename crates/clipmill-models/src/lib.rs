//! Shared data models for the ClipMill pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video and clip entities with their status state machines
//! - Transcript words and caption styling
//! - Per-video clipping settings
//! - Usage ledger entry records

pub mod caption;
pub mod clip;
pub mod ledger;
pub mod settings;
pub mod style;
pub mod video;

// Re-export common types
pub use caption::{CaptionStyle, CaptionTemplate, CaptionWord, TextAlignment};
pub use clip::{ClipId, ClipRecord, ClipStatus, SmartCropStatus};
pub use ledger::{LedgerEntryType, UsageLedgerEntry};
pub use settings::ClippingSettings;
pub use style::{AspectRatio, RenderQuality};
pub use video::{
    SourceType, TranscriptWord, TransitionError, VideoId, VideoRecord, VideoStatus,
};
