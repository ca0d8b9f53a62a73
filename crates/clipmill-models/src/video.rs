//! Video entity and its status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a video processing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where the source media comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Fetched from an external URL (e.g. a public video platform).
    ExternalUrl,
    /// Previously uploaded to object storage by the user.
    UploadedFile,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ExternalUrl => "external_url",
            SourceType::UploadedFile => "uploaded_file",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Video processing status.
///
/// Legal chain: `pending -> downloading -> uploading -> transcribing ->
/// analyzing -> completed`, with `failed` reachable from any
/// non-terminal state. `analyzing -> completed` is also taken directly
/// when clipping is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Pending,
    Downloading,
    Uploading,
    Transcribing,
    Analyzing,
    Completed,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Downloading => "downloading",
            VideoStatus::Uploading => "uploading",
            VideoStatus::Transcribing => "transcribing",
            VideoStatus::Analyzing => "analyzing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    /// Terminal states admit no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Pending, Downloading) => true,
            (Downloading, Uploading) => true,
            (Uploading, Transcribing) => true,
            (Transcribing, Analyzing) => true,
            (Analyzing, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raised when a status transition violates the state machine.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition from {from} to {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

/// A single transcribed word with absolute timing (seconds from video start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptWord {
    pub word: String,
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
}

/// Video record persisted by the ingestion stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    pub id: VideoId,

    /// Workspace the video (and its balance) belongs to.
    pub workspace_id: String,

    /// User who submitted the video.
    pub owner_id: String,

    #[serde(default)]
    pub status: VideoStatus,

    pub source_type: SourceType,

    /// External URL or storage key, depending on `source_type`.
    pub source_reference: String,

    /// Storage key of the stored source media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,

    /// Storage key of the extracted audio track.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,

    /// Storage key of the video thumbnail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,

    /// Source duration in seconds.
    #[serde(default)]
    pub duration_seconds: u32,

    /// Full transcript text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Word-level transcript timing.
    #[serde(default)]
    pub transcript_words: Vec<TranscriptWord>,

    /// Detected transcript language (BCP 47 tag).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Transcription confidence (0.0-1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_confidence: Option<f64>,

    /// Usage minutes debited at submission time. Set once; this is the
    /// exact amount refunded if processing fails.
    #[serde(default)]
    pub minutes_consumed: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl VideoRecord {
    /// Create a new pending video record.
    pub fn new(
        id: VideoId,
        workspace_id: impl Into<String>,
        owner_id: impl Into<String>,
        source_type: SourceType,
        source_reference: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            workspace_id: workspace_id.into(),
            owner_id: owner_id.into(),
            status: VideoStatus::Pending,
            source_type,
            source_reference: source_reference.into(),
            source_key: None,
            audio_key: None,
            thumbnail_key: None,
            duration_seconds: 0,
            transcript: None,
            transcript_words: Vec::new(),
            language: None,
            transcript_confidence: None,
            minutes_consumed: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Record the submission-time usage debit amount.
    pub fn with_minutes_consumed(mut self, minutes: u32) -> Self {
        self.minutes_consumed = minutes;
        self
    }

    /// Mark as completed.
    pub fn complete(mut self) -> Self {
        self.status = VideoStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark as failed with an error message.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = VideoStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self
    }

    /// Validate that an external-URL source reference parses as a URL.
    pub fn validate_source_reference(&self) -> Result<(), url::ParseError> {
        if self.source_type == SourceType::ExternalUrl {
            url::Url::parse(&self.source_reference)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_generation() {
        let id1 = VideoId::new();
        let id2 = VideoId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_status_chain_is_legal() {
        use VideoStatus::*;
        let chain = [Pending, Downloading, Uploading, Transcribing, Analyzing, Completed];
        for pair in chain.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        assert!(VideoStatus::Downloading.can_transition_to(VideoStatus::Failed));
        assert!(VideoStatus::Analyzing.can_transition_to(VideoStatus::Failed));
        assert!(!VideoStatus::Completed.can_transition_to(VideoStatus::Failed));
        assert!(!VideoStatus::Failed.can_transition_to(VideoStatus::Failed));
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!VideoStatus::Pending.can_transition_to(VideoStatus::Transcribing));
        assert!(!VideoStatus::Downloading.can_transition_to(VideoStatus::Completed));
    }

    #[test]
    fn test_record_fail_sets_message() {
        let rec = VideoRecord::new(
            VideoId::new(),
            "ws_1",
            "user_1",
            SourceType::ExternalUrl,
            "https://example.com/v.mp4",
        )
        .fail("download timed out");

        assert_eq!(rec.status, VideoStatus::Failed);
        assert_eq!(rec.error_message.as_deref(), Some("download timed out"));
        assert!(rec.failed_at.is_some());
    }

    #[test]
    fn test_source_reference_validation() {
        let good = VideoRecord::new(
            VideoId::new(),
            "ws_1",
            "user_1",
            SourceType::ExternalUrl,
            "https://example.com/v.mp4",
        );
        assert!(good.validate_source_reference().is_ok());

        let bad = VideoRecord::new(
            VideoId::new(),
            "ws_1",
            "user_1",
            SourceType::ExternalUrl,
            "not a url",
        );
        assert!(bad.validate_source_reference().is_err());

        // Uploaded files carry a storage key, not a URL.
        let uploaded = VideoRecord::new(
            VideoId::new(),
            "ws_1",
            "user_1",
            SourceType::UploadedFile,
            "uploads/ws_1/raw.mp4",
        );
        assert!(uploaded.validate_source_reference().is_ok());
    }
}
