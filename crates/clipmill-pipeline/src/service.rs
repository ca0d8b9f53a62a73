//! Pipeline service lifecycle and the submission surface.
//!
//! Owns both queues, their worker pools and cleanup tasks. Submission
//! debits usage minutes up front; the ingestion stage refunds them if
//! processing later fails terminally.

use std::sync::Arc;

use tracing::info;

use clipmill_ledger::UsageLedger;
use clipmill_models::{ClippingSettings, SourceType, VideoId, VideoRecord};
use clipmill_queue::{
    CleanupTask, DurableQueue, JobId, JobStatus, ProcessVideoJob, ProgressChannel, RenderClipJob,
    WorkerPool, WorkerPoolConfig,
};
use clipmill_store::{ClipStore, VideoStore};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{IngestionDeps, IngestionStage};
use crate::render::{RenderDeps, RenderStage};
use crate::services::{
    CaptionTranslator, MemorySettingsProvider, Notifier, ObjectStorage, ReframeDetector,
    RenderEngine, SegmentDetector, SourceFetcher, Transcriber,
};

/// External collaborators wired into both stage controllers.
pub struct Collaborators {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub storage: Arc<dyn ObjectStorage>,
    pub transcriber: Arc<dyn Transcriber>,
    pub detector: Arc<dyn SegmentDetector>,
    pub engine: Arc<dyn RenderEngine>,
    pub reframe_detector: Arc<dyn ReframeDetector>,
    pub translator: Arc<dyn CaptionTranslator>,
    pub notifier: Arc<dyn Notifier>,
}

/// A video submission request.
#[derive(Debug, Clone)]
pub struct SubmitVideoRequest {
    pub workspace_id: String,
    pub user_id: String,
    pub source_type: SourceType,
    /// External URL or storage key, depending on `source_type`.
    pub source_reference: String,
    /// Known source duration in seconds, used for the usage debit.
    pub duration_seconds: u32,
    pub settings: ClippingSettings,
}

/// Handle to a submitted video.
#[derive(Debug, Clone)]
pub struct VideoSubmission {
    pub video_id: VideoId,
    pub job_id: JobId,
}

/// Usage minutes debited for a source of this duration. Partial minutes
/// round up and every submission costs at least one minute.
fn minutes_for(duration_seconds: u32) -> u32 {
    duration_seconds.div_ceil(60).max(1)
}

/// The running pipeline: queues, worker pools and cleanup tasks.
pub struct PipelineService {
    videos: Arc<dyn VideoStore>,
    clips: Arc<dyn ClipStore>,
    ledger: Arc<UsageLedger>,
    settings: Arc<MemorySettingsProvider>,
    ingest_queue: Arc<DurableQueue<ProcessVideoJob>>,
    render_queue: Arc<DurableQueue<RenderClipJob>>,
    ingest_pool: WorkerPool,
    render_pool: WorkerPool,
    ingest_cleanup: CleanupTask,
    render_cleanup: CleanupTask,
}

impl PipelineService {
    /// Wire up both stages and start their worker pools.
    pub fn start(
        config: PipelineConfig,
        videos: Arc<dyn VideoStore>,
        clips: Arc<dyn ClipStore>,
        ledger: Arc<UsageLedger>,
        collaborators: Collaborators,
        progress_channel: Option<Arc<ProgressChannel>>,
    ) -> Self {
        let ingest_queue: Arc<DurableQueue<ProcessVideoJob>> =
            Arc::new(DurableQueue::new(config.queue.clone()));
        let render_queue: Arc<DurableQueue<RenderClipJob>> =
            Arc::new(DurableQueue::new(config.queue.clone()));
        let settings = Arc::new(MemorySettingsProvider::new());

        let ingestion = Arc::new(IngestionStage::new(
            IngestionDeps {
                videos: Arc::clone(&videos),
                clips: Arc::clone(&clips),
                ledger: Arc::clone(&ledger),
                settings: Arc::clone(&settings) as Arc<dyn crate::services::SettingsProvider>,
                fetcher: collaborators.fetcher,
                storage: Arc::clone(&collaborators.storage),
                transcriber: collaborators.transcriber,
                detector: collaborators.detector,
                notifier: Arc::clone(&collaborators.notifier),
                render_queue: Arc::clone(&render_queue),
            },
            config.clone(),
        ));
        let render = Arc::new(RenderStage::new(
            RenderDeps {
                videos: Arc::clone(&videos),
                clips: Arc::clone(&clips),
                ledger: Arc::clone(&ledger),
                storage: collaborators.storage,
                engine: collaborators.engine,
                reframe_detector: collaborators.reframe_detector,
                translator: collaborators.translator,
                notifier: collaborators.notifier,
            },
            config.clone(),
        ));

        let ingest_pool = WorkerPool::start(
            Arc::clone(&ingest_queue),
            ingestion,
            WorkerPoolConfig {
                concurrency: config.ingest_concurrency,
                poll_interval: config.poll_interval,
            },
            progress_channel.clone(),
        );
        let render_pool = WorkerPool::start(
            Arc::clone(&render_queue),
            render,
            WorkerPoolConfig {
                concurrency: config.render_concurrency,
                poll_interval: config.poll_interval,
            },
            progress_channel,
        );

        let ingest_cleanup = CleanupTask::start(Arc::clone(&ingest_queue), config.cleanup_interval);
        let render_cleanup = CleanupTask::start(Arc::clone(&render_queue), config.cleanup_interval);

        info!("Pipeline service started");
        Self {
            videos,
            clips,
            ledger,
            settings,
            ingest_queue,
            render_queue,
            ingest_pool,
            render_pool,
            ingest_cleanup,
            render_cleanup,
        }
    }

    /// Submit a video for processing.
    ///
    /// Debits the workspace before any work is enqueued; an
    /// insufficient balance rejects the submission outright. The video
    /// id doubles as the debit's correlation id so a later terminal
    /// failure refunds exactly this amount.
    pub async fn submit_video(
        &self,
        request: SubmitVideoRequest,
    ) -> PipelineResult<VideoSubmission> {
        let video_id = VideoId::new();
        let record = VideoRecord::new(
            video_id.clone(),
            request.workspace_id.clone(),
            request.user_id.clone(),
            request.source_type,
            request.source_reference.clone(),
        );
        record.validate_source_reference().map_err(|e| {
            PipelineError::validation(format!(
                "source reference is not a valid URL: {e}"
            ))
        })?;
        if !request.settings.duration_bounds_valid() {
            return Err(PipelineError::validation(
                "min clip duration must be below max clip duration",
            ));
        }

        let minutes = minutes_for(request.duration_seconds);
        self.ledger
            .debit(
                &request.workspace_id,
                minutes as i64,
                video_id.as_str(),
                "Video submission",
            )
            .await?;

        let record = record.with_minutes_consumed(minutes);
        if let Err(e) = self.videos.create(record).await {
            // Undo the debit; no work was enqueued.
            self.ledger
                .refund(
                    &request.workspace_id,
                    minutes as i64,
                    video_id.as_str(),
                    "Submission aborted",
                )
                .await;
            return Err(e.into());
        }
        self.settings.put(video_id.clone(), request.settings).await;

        let job_id = self.ingest_queue.enqueue(ProcessVideoJob::new(
            video_id.clone(),
            request.workspace_id,
            request.user_id,
            request.source_type,
            request.source_reference,
        ));

        info!(video_id = %video_id, job_id = %job_id, minutes = minutes, "Video submitted");
        Ok(VideoSubmission { video_id, job_id })
    }

    pub async fn video(&self, id: &VideoId) -> PipelineResult<VideoRecord> {
        Ok(self.videos.get(id).await?)
    }

    pub async fn clips_for(&self, id: &VideoId) -> PipelineResult<Vec<clipmill_models::ClipRecord>> {
        Ok(self.clips.list_for_video(id).await?)
    }

    pub async fn balance(&self, workspace_id: &str) -> i64 {
        self.ledger.balance(workspace_id).await
    }

    pub fn ingest_job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.ingest_queue.status(id)
    }

    pub fn render_job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.render_queue.status(id)
    }

    /// Stop worker pools and cleanup tasks, waiting for in-flight jobs.
    pub async fn shutdown(self) {
        self.ingest_pool.shutdown().await;
        self.render_pool.shutdown().await;
        self.ingest_cleanup.stop().await;
        self.render_cleanup.stop().await;
        info!("Pipeline service stopped");
    }
}

#[cfg(test)]
mod tests {
    use clipmill_models::LedgerEntryType;
    use clipmill_store::{MemoryClipStore, MemoryVideoStore};

    use super::*;
    use crate::services::{
        MockCaptionTranslator, MockNotifier, MockObjectStorage, MockReframeDetector,
        MockRenderEngine, MockSegmentDetector, MockSourceFetcher, MockTranscriber,
    };

    // Collaborator mocks with no expectations: these tests never let a
    // job reach a worker, so any call panics the test.
    fn idle_collaborators() -> Collaborators {
        Collaborators {
            fetcher: Arc::new(MockSourceFetcher::new()),
            storage: Arc::new(MockObjectStorage::new()),
            transcriber: Arc::new(MockTranscriber::new()),
            detector: Arc::new(MockSegmentDetector::new()),
            engine: Arc::new(MockRenderEngine::new()),
            reframe_detector: Arc::new(MockReframeDetector::new()),
            translator: Arc::new(MockCaptionTranslator::new()),
            notifier: Arc::new(MockNotifier::new()),
        }
    }

    fn service(ledger: Arc<UsageLedger>) -> PipelineService {
        PipelineService::start(
            PipelineConfig::default(),
            Arc::new(MemoryVideoStore::new()),
            Arc::new(MemoryClipStore::new()),
            ledger,
            idle_collaborators(),
            None,
        )
    }

    fn request(source_reference: &str, duration_seconds: u32) -> SubmitVideoRequest {
        SubmitVideoRequest {
            workspace_id: "ws_1".to_string(),
            user_id: "user_1".to_string(),
            source_type: SourceType::ExternalUrl,
            source_reference: source_reference.to_string(),
            duration_seconds,
            settings: ClippingSettings::default(),
        }
    }

    #[test]
    fn test_minutes_round_up_with_floor_of_one() {
        assert_eq!(minutes_for(0), 1);
        assert_eq!(minutes_for(59), 1);
        assert_eq!(minutes_for(60), 1);
        assert_eq!(minutes_for(61), 2);
        assert_eq!(minutes_for(600), 10);
    }

    #[tokio::test]
    async fn test_invalid_source_url_rejected_before_debit() {
        let ledger = Arc::new(UsageLedger::new());
        ledger
            .credit("ws_1", 10, LedgerEntryType::Purchase, "Top up")
            .await
            .unwrap();
        let svc = service(Arc::clone(&ledger));

        let err = svc.submit_video(request("not a url", 120)).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(ledger.balance("ws_1").await, 10);
        assert_eq!(ledger.entries("ws_1").await.len(), 1);

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects_submission() {
        let ledger = Arc::new(UsageLedger::new());
        ledger
            .credit("ws_1", 1, LedgerEntryType::Purchase, "Tiny")
            .await
            .unwrap();
        let svc = service(Arc::clone(&ledger));

        // 10 minutes of source against a balance of 1.
        let err = svc
            .submit_video(request("https://example.com/v.mp4", 600))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Ledger(clipmill_ledger::LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance("ws_1").await, 1);

        svc.shutdown().await;
    }

    #[tokio::test]
    async fn test_inverted_duration_bounds_rejected_before_debit() {
        let ledger = Arc::new(UsageLedger::new());
        ledger
            .credit("ws_1", 10, LedgerEntryType::Purchase, "Top up")
            .await
            .unwrap();
        let svc = service(Arc::clone(&ledger));

        let mut req = request("https://example.com/v.mp4", 120);
        req.settings.min_duration = 90;
        req.settings.max_duration = 15;
        let err = svc.submit_video(req).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(ledger.balance("ws_1").await, 10);

        svc.shutdown().await;
    }
}
