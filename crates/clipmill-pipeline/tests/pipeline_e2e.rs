//! End-to-end pipeline test: submission through ingestion and render
//! workers to delivered clips, against in-process fakes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use clipmill_ledger::UsageLedger;
use clipmill_models::{
    ClipStatus, ClippingSettings, LedgerEntryType, SourceType, TranscriptWord, VideoStatus,
};
use clipmill_pipeline::{
    Collaborators, CropPlan, FetchedSource, ObjectStorage, PipelineConfig, PipelineError,
    PipelineService, ProgressReporter, ReframeDetector, ReframeOutput, RenderEngine, RenderOutput,
    RenderRequest, SegmentCandidate, SegmentConstraints, SegmentDetector, SourceFetcher,
    SubmitVideoRequest, ThumbnailOutput, Transcriber, Transcription,
};
use clipmill_pipeline::{CaptionTranslator, Notifier};
use clipmill_queue::QueueConfig;
use clipmill_store::{ClipStore, MemoryClipStore, MemoryVideoStore, VideoStore};

struct FakeFetcher {
    duration_seconds: u32,
    fail: bool,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(
        &self,
        _source_type: SourceType,
        _source_reference: &str,
        dest_prefix: &str,
    ) -> Result<FetchedSource, PipelineError> {
        if self.fail {
            return Err(PipelineError::transient("download", "connection reset"));
        }
        Ok(FetchedSource {
            source_key: format!("{dest_prefix}/source.mp4"),
            audio_key: Some(format!("{dest_prefix}/audio.m4a")),
            duration_seconds: self.duration_seconds,
        })
    }
}

struct FakeStorage;

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put(&self, key: &str, _bytes: Vec<u8>) -> Result<String, PipelineError> {
        Ok(format!("https://storage.test/{key}"))
    }

    async fn signed_url(&self, key: &str, _ttl: Duration) -> Result<String, PipelineError> {
        Ok(format!("https://signed.test/{key}"))
    }

    async fn delete(&self, _key: &str) -> Result<(), PipelineError> {
        Ok(())
    }
}

struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe<'a>(
        &self,
        _audio_url: &str,
        _language_hint: Option<&'a str>,
    ) -> Result<Transcription, PipelineError> {
        // One word every two seconds across the whole source.
        let words: Vec<TranscriptWord> = (0..300)
            .map(|i| TranscriptWord {
                word: format!("word{i}"),
                start: (i * 2) as f64,
                end: (i * 2) as f64 + 1.0,
            })
            .collect();
        let text = words
            .iter()
            .map(|w| w.word.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Transcription {
            text,
            words,
            language: Some("en".to_string()),
            confidence: Some(0.97),
        })
    }
}

struct FakeDetector;

#[async_trait]
impl SegmentDetector for FakeDetector {
    async fn detect(
        &self,
        _transcript: &str,
        _words: &[TranscriptWord],
        _constraints: &SegmentConstraints,
    ) -> Result<Vec<SegmentCandidate>, PipelineError> {
        Ok(vec![
            SegmentCandidate {
                title: "The big reveal".to_string(),
                start_time: 10,
                end_time: 40,
                score: 0.92,
                hooks: vec!["curiosity".to_string()],
                emotions: vec!["surprise".to_string()],
            },
            SegmentCandidate {
                title: "Hot take".to_string(),
                start_time: 100,
                end_time: 160,
                score: 0.81,
                hooks: vec!["controversy".to_string()],
                emotions: vec![],
            },
        ])
    }
}

struct FakeEngine;

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn render(
        &self,
        request: &RenderRequest,
        progress: &ProgressReporter,
    ) -> Result<RenderOutput, PipelineError> {
        progress.report(100);
        Ok(RenderOutput {
            rendered_key: format!("{}/final.mp4", request.dest_prefix),
            raw_key: format!("{}/raw.mp4", request.dest_prefix),
            file_size: 2048,
        })
    }

    async fn reframe(
        &self,
        _raw_url: &str,
        _plan: &CropPlan,
        dest_prefix: &str,
    ) -> Result<ReframeOutput, PipelineError> {
        Ok(ReframeOutput {
            key: format!("{dest_prefix}/reframed.mp4"),
            url: "https://signed.test/reframed.mp4".to_string(),
        })
    }

    async fn thumbnail(&self, source_key: &str) -> Result<ThumbnailOutput, PipelineError> {
        Ok(ThumbnailOutput {
            key: format!("{source_key}.jpg"),
            url: format!("https://signed.test/{source_key}.jpg"),
        })
    }
}

struct FakeReframeDetector;

#[async_trait]
impl ReframeDetector for FakeReframeDetector {
    async fn plan(&self, _raw_url: &str) -> Result<CropPlan, PipelineError> {
        Ok(CropPlan::default())
    }
}

struct FakeTranslator;

#[async_trait]
impl CaptionTranslator for FakeTranslator {
    async fn translated_captions(
        &self,
        _clip_id: &clipmill_models::ClipId,
        _language: &str,
    ) -> Result<Option<Vec<clipmill_models::CaptionWord>>, PipelineError> {
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        event: &str,
        _recipient: &str,
        _data: serde_json::Value,
    ) -> Result<(), PipelineError> {
        self.events.lock().unwrap().push(event.to_string());
        Ok(())
    }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval: Duration::from_millis(5),
        // Long enough to never sweep mid-test.
        cleanup_interval: Duration::from_secs(3600),
        queue: QueueConfig {
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
            ..QueueConfig::default()
        },
        ..PipelineConfig::default()
    }
}

struct Harness {
    videos: Arc<MemoryVideoStore>,
    clips: Arc<MemoryClipStore>,
    ledger: Arc<UsageLedger>,
    notifier: Arc<RecordingNotifier>,
    service: PipelineService,
}

fn start_pipeline(fetcher_fails: bool) -> Harness {
    let videos = Arc::new(MemoryVideoStore::new());
    let clips = Arc::new(MemoryClipStore::new());
    let ledger = Arc::new(UsageLedger::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let service = PipelineService::start(
        fast_config(),
        Arc::clone(&videos) as Arc<dyn VideoStore>,
        Arc::clone(&clips) as Arc<dyn ClipStore>,
        Arc::clone(&ledger),
        Collaborators {
            fetcher: Arc::new(FakeFetcher {
                duration_seconds: 600,
                fail: fetcher_fails,
            }),
            storage: Arc::new(FakeStorage),
            transcriber: Arc::new(FakeTranscriber),
            detector: Arc::new(FakeDetector),
            engine: Arc::new(FakeEngine),
            reframe_detector: Arc::new(FakeReframeDetector),
            translator: Arc::new(FakeTranslator),
            notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
        },
        None,
    );

    Harness {
        videos,
        clips,
        ledger,
        notifier,
        service,
    }
}

async fn wait_video_status(videos: &MemoryVideoStore, id: &clipmill_models::VideoId, status: VideoStatus) {
    for _ in 0..1000 {
        if videos.get(id).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("video never reached {status}");
}

async fn wait_clips_ready(clips: &MemoryClipStore, id: &clipmill_models::VideoId, count: usize) {
    for _ in 0..1000 {
        let found = clips.list_for_video(id).await.unwrap();
        if found.len() == count && found.iter().all(|c| c.status == ClipStatus::Ready) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("clips never all reached ready");
}

async fn wait_balance(ledger: &UsageLedger, workspace_id: &str, expected: i64) {
    for _ in 0..1000 {
        if ledger.balance(workspace_id).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("balance never reached {expected}");
}

#[tokio::test]
async fn test_submission_to_delivered_clips() -> Result<()> {
    let h = start_pipeline(false);
    h.ledger
        .credit("ws_1", 50, LedgerEntryType::Purchase, "Top up")
        .await?;

    let submission = h
        .service
        .submit_video(SubmitVideoRequest {
            workspace_id: "ws_1".to_string(),
            user_id: "user_1".to_string(),
            source_type: SourceType::ExternalUrl,
            source_reference: "https://example.com/podcast.mp4".to_string(),
            duration_seconds: 600,
            settings: ClippingSettings {
                credit_cost_per_clip: 2,
                ..ClippingSettings::default()
            },
        })
        .await?;

    // 600s rounds to 10 minutes, debited up front.
    assert_eq!(h.ledger.balance("ws_1").await, 40);

    let video_id = submission.video_id.clone();
    wait_video_status(&h.videos, &video_id, VideoStatus::Completed).await;

    let video = h.videos.get(&video_id).await?;
    assert_eq!(
        video.source_key.as_deref(),
        Some(format!("videos/{video_id}/source.mp4").as_str())
    );
    assert_eq!(video.duration_seconds, 600);
    assert!(video.transcript.is_some());

    wait_clips_ready(&h.clips, &video_id, 2).await;

    let clips = h.clips.list_for_video(&video_id).await?;
    for clip in &clips {
        assert!(clip.rendered_key.is_some());
        assert!(clip.thumbnail_key.is_some());
        assert!(clip.transcript.is_some());
    }
    // Sorted by start time regardless of score order.
    assert_eq!(clips[0].start_time, 10);
    assert_eq!(clips[1].start_time, 100);

    // 10 minutes for ingestion plus 2 credits per rendered clip.
    assert_eq!(h.ledger.balance("ws_1").await, 36);

    let events = h.notifier.events();
    assert!(events.contains(&"video_processed".to_string()));
    assert!(events.contains(&"all_clips_ready".to_string()));

    h.service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_acquisition_failure_refunds_submission_minutes() -> Result<()> {
    let h = start_pipeline(true);
    h.ledger
        .credit("ws_1", 50, LedgerEntryType::Purchase, "Top up")
        .await?;

    let submission = h
        .service
        .submit_video(SubmitVideoRequest {
            workspace_id: "ws_1".to_string(),
            user_id: "user_1".to_string(),
            source_type: SourceType::ExternalUrl,
            source_reference: "https://example.com/podcast.mp4".to_string(),
            duration_seconds: 600,
            settings: ClippingSettings::default(),
        })
        .await?;
    assert_eq!(h.ledger.balance("ws_1").await, 40);

    let video_id = submission.video_id.clone();
    wait_video_status(&h.videos, &video_id, VideoStatus::Failed).await;

    // Retries exhausted: minutes refunded, no clips persisted.
    wait_balance(&h.ledger, "ws_1", 50).await;
    let refunds: Vec<_> = h
        .ledger
        .entries("ws_1")
        .await
        .into_iter()
        .filter(|e| e.entry_type == LedgerEntryType::Refund)
        .collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].correlation_id.as_deref(), Some(video_id.as_str()));
    assert!(h.clips.list_for_video(&video_id).await?.is_empty());

    h.service.shutdown().await;
    Ok(())
}
