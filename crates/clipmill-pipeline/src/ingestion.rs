//! Ingestion stage controller.
//!
//! Drives a video from `pending` through download, storage,
//! transcription and segment detection to `completed`, fanning out one
//! render job per persisted clip. Any required-step failure moves the
//! video to `failed` and refunds the minutes debited at submission.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout;

use clipmill_ledger::UsageLedger;
use clipmill_models::caption::reanchor_words;
use clipmill_models::{
    CaptionTemplate, ClipRecord, ClippingSettings, TranscriptWord, VideoId, VideoStatus,
};
use clipmill_queue::{
    DurableQueue, JobAttempt, JobError, JobHandler, ProcessVideoJob, ProgressHandle, RenderClipJob,
};
use clipmill_store::{ClipStore, VideoStore};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::services::{
    Notifier, ObjectStorage, SegmentConstraints, SegmentDetector, SettingsProvider, SourceFetcher,
    Transcriber, Transcription,
};

/// Collaborators and stores the ingestion stage operates on.
pub struct IngestionDeps {
    pub videos: Arc<dyn VideoStore>,
    pub clips: Arc<dyn ClipStore>,
    pub ledger: Arc<UsageLedger>,
    pub settings: Arc<dyn SettingsProvider>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub storage: Arc<dyn ObjectStorage>,
    pub transcriber: Arc<dyn Transcriber>,
    pub detector: Arc<dyn SegmentDetector>,
    pub notifier: Arc<dyn Notifier>,
    /// Render jobs fan out onto this queue.
    pub render_queue: Arc<DurableQueue<RenderClipJob>>,
}

pub struct IngestionStage {
    deps: IngestionDeps,
    config: PipelineConfig,
}

/// Chain position, used to skip transitions a resumed attempt has
/// already made.
fn rank(status: VideoStatus) -> u8 {
    match status {
        VideoStatus::Pending => 0,
        VideoStatus::Downloading => 1,
        VideoStatus::Uploading => 2,
        VideoStatus::Transcribing => 3,
        VideoStatus::Analyzing => 4,
        VideoStatus::Completed | VideoStatus::Failed => 5,
    }
}

fn words_text(words: &[TranscriptWord]) -> String {
    words
        .iter()
        .map(|w| w.word.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

impl IngestionStage {
    pub fn new(deps: IngestionDeps, config: PipelineConfig) -> Self {
        Self { deps, config }
    }

    fn storage_prefix(video_id: &VideoId) -> String {
        format!("videos/{video_id}")
    }

    /// Move the video forward to `target` unless a previous attempt got
    /// there already.
    async fn advance(&self, id: &VideoId, target: VideoStatus) -> PipelineResult<()> {
        let video = self.deps.videos.get(id).await?;
        if rank(video.status) >= rank(target) {
            return Ok(());
        }
        self.deps.videos.transition(id, target).await?;
        Ok(())
    }

    async fn notify_best_effort(
        &self,
        event: &str,
        recipient: &str,
        data: serde_json::Value,
        logger: &JobLogger,
    ) {
        if let Err(e) = self.deps.notifier.notify(event, recipient, data).await {
            logger.log_warning(&format!("Notification '{event}' failed: {e}"));
        }
    }

    async fn run(
        &self,
        job: &ProcessVideoJob,
        logger: &JobLogger,
        progress: &ProgressHandle<ProcessVideoJob>,
    ) -> PipelineResult<()> {
        let video = self.deps.videos.get(&job.video_id).await?;
        match video.status {
            VideoStatus::Completed => {
                logger.log_progress("Video already completed, nothing to do");
                return Ok(());
            }
            VideoStatus::Failed => {
                return Err(PipelineError::validation(format!(
                    "video {} already failed",
                    job.video_id
                )));
            }
            _ => {}
        }

        let settings = self
            .deps
            .settings
            .settings_for(&job.video_id)
            .await?
            .unwrap_or_default();
        if !settings.duration_bounds_valid() {
            return Err(PipelineError::validation(format!(
                "min_duration ({}) must be less than max_duration ({})",
                settings.min_duration, settings.max_duration
            )));
        }
        progress.report(5).await;

        // Acquire and store the source media.
        self.advance(&job.video_id, VideoStatus::Downloading).await?;
        let prefix = Self::storage_prefix(&job.video_id);
        let (source_key, audio_key, duration_seconds) = if let Some(key) = video.source_key.clone()
        {
            logger.log_progress("Source already stored, skipping acquisition");
            (key, video.audio_key.clone(), video.duration_seconds)
        } else {
            let fetched = match timeout(
                self.config.acquire_timeout,
                self.deps
                    .fetcher
                    .fetch(job.source_type, &job.source_reference, &prefix),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(PipelineError::transient(
                        "download",
                        format!(
                            "source acquisition exceeded {}s",
                            self.config.acquire_timeout.as_secs()
                        ),
                    ));
                }
            };
            (
                fetched.source_key,
                fetched.audio_key,
                fetched.duration_seconds,
            )
        };

        self.advance(&job.video_id, VideoStatus::Uploading).await?;
        self.deps
            .videos
            .set_media(
                &job.video_id,
                &source_key,
                audio_key.as_deref(),
                duration_seconds,
            )
            .await?;
        progress.report(15).await;

        // Transcribe from the audio track when one was extracted.
        self.advance(&job.video_id, VideoStatus::Transcribing)
            .await?;
        let tx = if video.transcript.is_some() && !video.transcript_words.is_empty() {
            logger.log_progress("Transcript already present, skipping transcription");
            Transcription {
                text: video.transcript.clone().unwrap_or_default(),
                words: video.transcript_words.clone(),
                language: video.language.clone(),
                confidence: video.transcript_confidence,
            }
        } else {
            let audio_ref = audio_key.as_deref().unwrap_or(&source_key);
            let audio_url = self
                .deps
                .storage
                .signed_url(audio_ref, self.config.signed_url_ttl)
                .await?;
            self.deps
                .transcriber
                .transcribe(&audio_url, settings.language_hint.as_deref())
                .await?
        };
        progress.report(40).await;

        self.advance(&job.video_id, VideoStatus::Analyzing).await?;
        self.deps
            .videos
            .set_transcript(
                &job.video_id,
                &tx.text,
                tx.words.clone(),
                tx.language.clone(),
                tx.confidence,
            )
            .await?;
        progress.report(60).await;

        if settings.skip_clipping {
            self.deps.videos.complete(&job.video_id).await?;
            progress.report(100).await;
            logger.log_progress("Clipping skipped by configuration");
            self.notify_video_processed(job, 0, logger).await;
            return Ok(());
        }

        let clips = self
            .detect_and_persist(job, &settings, &tx, duration_seconds, logger)
            .await?;
        progress.report(85).await;

        for clip in &clips {
            let render = self.build_render_job(job, &settings, &tx, clip);
            self.deps.render_queue.enqueue(render);
        }

        self.deps.videos.complete(&job.video_id).await?;
        progress.report(100).await;
        self.notify_video_processed(job, clips.len(), logger).await;
        Ok(())
    }

    /// Run detection inside the configured timeframe window and persist
    /// the surviving candidates as one batch.
    async fn detect_and_persist(
        &self,
        job: &ProcessVideoJob,
        settings: &ClippingSettings,
        tx: &Transcription,
        duration_seconds: u32,
        logger: &JobLogger,
    ) -> PipelineResult<Vec<ClipRecord>> {
        let (win_start, win_end) = settings.timeframe(duration_seconds as f64);
        let window_words: Vec<TranscriptWord> = tx
            .words
            .iter()
            .filter(|w| w.start >= win_start && w.end <= win_end)
            .cloned()
            .collect();
        let window_transcript = words_text(&window_words);

        let constraints = SegmentConstraints {
            min_duration: settings.min_duration,
            max_duration: settings.max_duration,
            max_clips: settings.max_clips,
            genre: settings.genre.clone(),
        };
        let candidates = self
            .deps
            .detector
            .detect(&window_transcript, &window_words, &constraints)
            .await?;
        logger.log_progress(&format!("Detection returned {} candidates", candidates.len()));

        let mut kept: Vec<_> = candidates
            .into_iter()
            .filter(|c| {
                let duration = c.end_time.saturating_sub(c.start_time);
                duration >= settings.min_duration && duration <= settings.max_duration
            })
            .collect();
        kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        kept.truncate(settings.max_clips as usize);

        let records: Vec<ClipRecord> = kept
            .into_iter()
            .map(|c| {
                let clip_words: Vec<TranscriptWord> = tx
                    .words
                    .iter()
                    .filter(|w| w.start >= c.start_time as f64 && w.end <= c.end_time as f64)
                    .cloned()
                    .collect();
                ClipRecord::new(
                    job.video_id.clone(),
                    job.workspace_id.clone(),
                    c.start_time,
                    c.end_time,
                )
                .with_title(c.title)
                .with_transcript(words_text(&clip_words))
                .with_score(c.score)
                .with_hooks(c.hooks)
                .with_emotions(c.emotions)
            })
            .collect();

        if !records.is_empty() {
            self.deps.clips.insert_batch(records.clone()).await?;
            metrics::record_clips_detected(records.len());
        }
        Ok(records)
    }

    fn build_render_job(
        &self,
        job: &ProcessVideoJob,
        settings: &ClippingSettings,
        tx: &Transcription,
        clip: &ClipRecord,
    ) -> RenderClipJob {
        let mut render = RenderClipJob::new(
            clip.id.clone(),
            job.video_id.clone(),
            job.workspace_id.clone(),
            job.user_id.clone(),
            clip.start_time,
            clip.end_time,
        );
        render.aspect_ratio = settings.aspect_ratio;
        render.quality = settings.quality;
        render.credit_cost = settings.credit_cost_per_clip;
        render.watermark = settings.watermark;
        render.intro_title = settings.intro_title.clone();
        render.target_language = settings.target_language.clone();
        render.split_screen = settings.split_screen_key.clone();
        render.smart_crop_enabled = settings.smart_crop_enabled;

        if settings.caption_template != CaptionTemplate::Off {
            let words = reanchor_words(
                &tx.words,
                clip.start_time as f64,
                clip.end_time as f64,
            );
            render.captions = Some(words);
            render.caption_style = Some(settings.caption_template.style());
        }
        if settings.emoji_transcript {
            render.emoji_transcript = clip.transcript.clone();
        }
        render
    }

    async fn notify_video_processed(
        &self,
        job: &ProcessVideoJob,
        clip_count: usize,
        logger: &JobLogger,
    ) {
        self.notify_best_effort(
            "video_processed",
            &job.user_id,
            serde_json::json!({
                "video_id": job.video_id,
                "workspace_id": job.workspace_id,
                "clip_count": clip_count,
            }),
            logger,
        )
        .await;
    }

    /// Terminal failure path: fail the video, refund the minutes
    /// debited at submission, and clean up partially-written media when
    /// acquisition was still in flight.
    async fn handle_terminal_failure(
        &self,
        job: &ProcessVideoJob,
        err: &PipelineError,
        logger: &JobLogger,
    ) {
        logger.log_error(&format!("Ingestion failed terminally: {err}"));
        metrics::record_video_failed();

        let video = match self.deps.videos.get(&job.video_id).await {
            Ok(v) => v,
            Err(e) => {
                logger.log_warning(&format!("Could not load video for failure handling: {e}"));
                return;
            }
        };
        let acquisition_in_flight = matches!(
            video.status,
            VideoStatus::Downloading | VideoStatus::Uploading
        );

        if let Err(e) = self.deps.videos.fail(&job.video_id, &err.to_string()).await {
            logger.log_warning(&format!("Could not mark video failed: {e}"));
        }

        if video.minutes_consumed > 0 {
            self.deps
                .ledger
                .refund(
                    &video.workspace_id,
                    video.minutes_consumed as i64,
                    video.id.as_str(),
                    "Video processing failed",
                )
                .await;
        }

        if acquisition_in_flight {
            let prefix = Self::storage_prefix(&job.video_id);
            for key in [format!("{prefix}/source.mp4"), format!("{prefix}/audio.m4a")] {
                if let Err(e) = self.deps.storage.delete(&key).await {
                    logger.log_warning(&format!("Partial object cleanup failed for {key}: {e}"));
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler<ProcessVideoJob> for IngestionStage {
    async fn handle(
        &self,
        attempt: &JobAttempt<ProcessVideoJob>,
        progress: &ProgressHandle<ProcessVideoJob>,
    ) -> Result<(), JobError> {
        let logger = JobLogger::new(&attempt.job_id, "ingest");
        logger.log_start(&format!(
            "Processing video {} (attempt {}/{})",
            attempt.payload.video_id, attempt.attempts_made, attempt.max_attempts
        ));

        match self.run(&attempt.payload, &logger, progress).await {
            Ok(()) => {
                metrics::record_video_completed();
                logger.log_completion(&format!("Video {} processed", attempt.payload.video_id));
                Ok(())
            }
            Err(e) => {
                if !e.is_retryable() || attempt.is_final_attempt() {
                    self.handle_terminal_failure(&attempt.payload, &e, &logger)
                        .await;
                } else {
                    logger.log_warning(&format!("Attempt failed, queue will retry: {e}"));
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clipmill_models::{LedgerEntryType, SourceType, VideoRecord};
    use clipmill_queue::{JobId, QueueConfig};
    use clipmill_store::{MemoryClipStore, MemoryVideoStore};

    use super::*;
    use crate::services::{
        FetchedSource, MemorySettingsProvider, MockNotifier, MockObjectStorage,
        MockSegmentDetector, MockSourceFetcher, MockTranscriber, SegmentCandidate,
    };

    struct Fixture {
        videos: Arc<MemoryVideoStore>,
        clips: Arc<MemoryClipStore>,
        ledger: Arc<UsageLedger>,
        settings: Arc<MemorySettingsProvider>,
        render_queue: Arc<DurableQueue<RenderClipJob>>,
        fetcher: MockSourceFetcher,
        storage: MockObjectStorage,
        transcriber: MockTranscriber,
        detector: MockSegmentDetector,
        notifier: MockNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                videos: Arc::new(MemoryVideoStore::new()),
                clips: Arc::new(MemoryClipStore::new()),
                ledger: Arc::new(UsageLedger::new()),
                settings: Arc::new(MemorySettingsProvider::new()),
                render_queue: Arc::new(DurableQueue::new(QueueConfig::default())),
                fetcher: MockSourceFetcher::new(),
                storage: MockObjectStorage::new(),
                transcriber: MockTranscriber::new(),
                detector: MockSegmentDetector::new(),
                notifier: MockNotifier::new(),
            }
        }

        fn stage(self) -> (IngestionStage, Arc<MemoryVideoStore>, Arc<MemoryClipStore>, Arc<UsageLedger>, Arc<DurableQueue<RenderClipJob>>) {
            let videos = Arc::clone(&self.videos);
            let clips = Arc::clone(&self.clips);
            let ledger = Arc::clone(&self.ledger);
            let render_queue = Arc::clone(&self.render_queue);
            let stage = IngestionStage::new(
                IngestionDeps {
                    videos: self.videos,
                    clips: self.clips,
                    ledger: Arc::clone(&self.ledger),
                    settings: self.settings,
                    fetcher: Arc::new(self.fetcher),
                    storage: Arc::new(self.storage),
                    transcriber: Arc::new(self.transcriber),
                    detector: Arc::new(self.detector),
                    notifier: Arc::new(self.notifier),
                    render_queue: self.render_queue,
                },
                PipelineConfig::default(),
            );
            (stage, videos, clips, ledger, render_queue)
        }
    }

    fn job(video_id: &VideoId) -> ProcessVideoJob {
        ProcessVideoJob::new(
            video_id.clone(),
            "ws_1",
            "user_1",
            SourceType::ExternalUrl,
            "https://example.com/v.mp4",
        )
    }

    fn attempt(payload: ProcessVideoJob, made: u32, max: u32) -> JobAttempt<ProcessVideoJob> {
        JobAttempt {
            job_id: JobId::new(),
            payload,
            attempts_made: made,
            max_attempts: max,
        }
    }

    fn progress_handle() -> ProgressHandle<ProcessVideoJob> {
        ProgressHandle::new(
            Arc::new(DurableQueue::new(QueueConfig::default())),
            JobId::new(),
            None,
        )
    }

    fn word(text: &str, start: f64, end: f64) -> TranscriptWord {
        TranscriptWord {
            word: text.to_string(),
            start,
            end,
        }
    }

    fn sample_transcription() -> Transcription {
        Transcription {
            text: "hello world again".to_string(),
            words: vec![
                word("hello", 1.0, 1.5),
                word("world", 2.0, 2.5),
                word("again", 100.0, 100.5),
            ],
            language: Some("en".to_string()),
            confidence: Some(0.93),
        }
    }

    fn expect_happy_path_until_detection(f: &mut Fixture) {
        f.fetcher.expect_fetch().returning(|_, _, prefix| {
            let prefix = prefix.to_string();
            Ok(FetchedSource {
                source_key: format!("{prefix}/source.mp4"),
                audio_key: Some(format!("{prefix}/audio.m4a")),
                duration_seconds: 300,
            })
        });
        f.storage
            .expect_signed_url()
            .returning(|key, _| Ok(format!("https://signed.example/{key}")));
        f.transcriber
            .expect_transcribe()
            .returning(|_, _| Ok(sample_transcription()));
        f.notifier.expect_notify().returning(|_, _, _| Ok(()));
    }

    async fn seed_video(videos: &MemoryVideoStore, id: &VideoId) {
        videos
            .create(VideoRecord::new(
                id.clone(),
                "ws_1",
                "user_1",
                SourceType::ExternalUrl,
                "https://example.com/v.mp4",
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_skip_clipping_completes_with_no_clips_or_jobs() {
        let mut f = Fixture::new();
        expect_happy_path_until_detection(&mut f);
        // Detector must not be invoked at all.
        let video_id = VideoId::from("v1");
        seed_video(&f.videos, &video_id).await;
        f.settings
            .put(
                video_id.clone(),
                ClippingSettings {
                    skip_clipping: true,
                    ..Default::default()
                },
            )
            .await;

        let (stage, videos, clips, _, render_queue) = f.stage();
        stage
            .handle(&attempt(job(&video_id), 1, 3), &progress_handle())
            .await
            .unwrap();

        assert_eq!(videos.get(&video_id).await.unwrap().status, VideoStatus::Completed);
        assert!(clips.list_for_video(&video_id).await.unwrap().is_empty());
        assert_eq!(render_queue.live_len(), 0);
    }

    #[tokio::test]
    async fn test_detection_filters_sorts_and_truncates() {
        let mut f = Fixture::new();
        expect_happy_path_until_detection(&mut f);
        f.detector.expect_detect().returning(|_, _, _| {
            let candidate = |title: &str, start: u32, end: u32, score: f64| SegmentCandidate {
                title: title.to_string(),
                start_time: start,
                end_time: end,
                score,
                hooks: vec![],
                emotions: vec![],
            };
            Ok(vec![
                candidate("a", 0, 30, 0.5),
                candidate("b", 10, 40, 0.9),
                candidate("c", 20, 50, 0.7),
                candidate("d", 30, 60, 0.8),
                candidate("e", 40, 70, 0.6),
                candidate("f", 50, 80, 0.4),
                candidate("too-short", 60, 65, 0.99),
            ])
        });

        let video_id = VideoId::from("v1");
        seed_video(&f.videos, &video_id).await;
        f.settings
            .put(
                video_id.clone(),
                ClippingSettings {
                    min_duration: 15,
                    max_duration: 90,
                    max_clips: 5,
                    ..Default::default()
                },
            )
            .await;

        let (stage, videos, clips, _, render_queue) = f.stage();
        stage
            .handle(&attempt(job(&video_id), 1, 3), &progress_handle())
            .await
            .unwrap();

        let persisted = clips.list_for_video(&video_id).await.unwrap();
        assert_eq!(persisted.len(), 5);
        // Highest five scores survive; "too-short" was filtered out.
        let mut scores: Vec<f64> = persisted.iter().map(|c| c.score).collect();
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(scores, vec![0.9, 0.8, 0.7, 0.6, 0.5]);
        assert!(persisted.iter().all(|c| c.title.as_deref() != Some("too-short")));

        assert_eq!(render_queue.live_len(), 5);
        assert_eq!(videos.get(&video_id).await.unwrap().status, VideoStatus::Completed);
    }

    #[tokio::test]
    async fn test_inverted_duration_bounds_rejected_before_any_collaborator() {
        let f = Fixture::new();
        // No expectations at all: any collaborator call panics the test.
        let video_id = VideoId::from("v1");
        seed_video(&f.videos, &video_id).await;
        f.settings
            .put(
                video_id.clone(),
                ClippingSettings {
                    min_duration: 90,
                    max_duration: 90,
                    ..Default::default()
                },
            )
            .await;

        let (stage, videos, _, _, _) = f.stage();
        let err = stage
            .handle(&attempt(job(&video_id), 1, 3), &progress_handle())
            .await
            .unwrap_err();
        assert!(!err.retryable);
        assert_eq!(videos.get(&video_id).await.unwrap().status, VideoStatus::Failed);
    }

    #[tokio::test]
    async fn test_terminal_failure_refunds_submission_minutes_and_cleans_up() {
        let mut f = Fixture::new();
        f.fetcher
            .expect_fetch()
            .returning(|_, _, _| Err(PipelineError::transient("download", "connection reset")));
        f.storage.expect_delete().times(2).returning(|_| Ok(()));

        let video_id = VideoId::from("v1");
        f.videos
            .create(
                VideoRecord::new(
                    video_id.clone(),
                    "ws_1",
                    "user_1",
                    SourceType::ExternalUrl,
                    "https://example.com/v.mp4",
                )
                .with_minutes_consumed(5),
            )
            .await
            .unwrap();
        f.ledger
            .credit("ws_1", 20, LedgerEntryType::Purchase, "Top up")
            .await
            .unwrap();
        f.ledger
            .debit("ws_1", 5, video_id.as_str(), "Video submission")
            .await
            .unwrap();

        let (stage, videos, _, ledger, _) = f.stage();
        // Final attempt: the failure is terminal.
        let err = stage
            .handle(&attempt(job(&video_id), 3, 3), &progress_handle())
            .await
            .unwrap_err();
        assert!(err.retryable);

        let video = videos.get(&video_id).await.unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert!(video.error_message.is_some());

        // Exactly one refund matching the submission debit.
        assert_eq!(ledger.balance("ws_1").await, 20);
        let refunds: Vec<_> = ledger
            .entries("ws_1")
            .await
            .into_iter()
            .filter(|e| e.entry_type == LedgerEntryType::Refund)
            .collect();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 5);
        assert_eq!(refunds[0].correlation_id.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_non_final_transient_failure_leaves_video_untouched() {
        let mut f = Fixture::new();
        f.fetcher
            .expect_fetch()
            .returning(|_, _, _| Err(PipelineError::transient("download", "connection reset")));

        let video_id = VideoId::from("v1");
        seed_video(&f.videos, &video_id).await;

        let (stage, videos, _, ledger, _) = f.stage();
        let err = stage
            .handle(&attempt(job(&video_id), 1, 3), &progress_handle())
            .await
            .unwrap_err();
        assert!(err.retryable);

        // Not failed, no refund: the queue will retry.
        assert_eq!(videos.get(&video_id).await.unwrap().status, VideoStatus::Downloading);
        assert!(ledger.entries("ws_1").await.is_empty());
    }

    #[tokio::test]
    async fn test_render_jobs_carry_reanchored_captions() {
        let mut f = Fixture::new();
        expect_happy_path_until_detection(&mut f);
        f.detector.expect_detect().returning(|_, _, _| {
            Ok(vec![SegmentCandidate {
                title: "hook".to_string(),
                start_time: 1,
                end_time: 31,
                score: 0.8,
                hooks: vec!["question".to_string()],
                emotions: vec![],
            }])
        });

        let video_id = VideoId::from("v1");
        seed_video(&f.videos, &video_id).await;
        f.settings
            .put(video_id.clone(), ClippingSettings::default())
            .await;

        let (stage, _, clips, _, render_queue) = f.stage();
        stage
            .handle(&attempt(job(&video_id), 1, 3), &progress_handle())
            .await
            .unwrap();

        let clip = &clips.list_for_video(&video_id).await.unwrap()[0];
        let (_, payload) = render_queue
            .find_live_by_dedupe_key(&format!("clip-{}", clip.id))
            .unwrap();

        // Words at 2.0-2.5s become clip-relative 1.0-1.5s ("hello" at
        // 1.0-1.5 sits exactly on the boundary and is kept too).
        let captions = payload.captions.unwrap();
        assert_eq!(captions.len(), 2);
        assert!((captions[1].start - 1.0).abs() < 1e-9);
        assert!(payload.caption_style.is_some());
    }

    /// A fetcher that never finishes, for exercising the bounded wait.
    struct StalledFetcher;

    #[async_trait]
    impl SourceFetcher for StalledFetcher {
        async fn fetch(
            &self,
            _source_type: SourceType,
            _source_reference: &str,
            _dest_prefix: &str,
        ) -> PipelineResult<FetchedSource> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("fetch should have timed out")
        }
    }

    #[tokio::test]
    async fn test_acquisition_timeout_is_transient() {
        let f = Fixture::new();
        let video_id = VideoId::from("v1");
        seed_video(&f.videos, &video_id).await;

        let videos = Arc::clone(&f.videos);
        let stage = IngestionStage::new(
            IngestionDeps {
                videos,
                clips: f.clips,
                ledger: f.ledger,
                settings: f.settings,
                fetcher: Arc::new(StalledFetcher),
                storage: Arc::new(f.storage),
                transcriber: Arc::new(f.transcriber),
                detector: Arc::new(f.detector),
                notifier: Arc::new(f.notifier),
                render_queue: f.render_queue,
            },
            PipelineConfig {
                acquire_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let err = stage
            .handle(&attempt(job(&video_id), 1, 3), &progress_handle())
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("acquisition"));
    }
}
