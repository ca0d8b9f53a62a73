//! Render stage controller.
//!
//! Takes a detected clip through billing, caption preparation,
//! validation and the rendering engine to `ready`. The smart-crop
//! sub-pipeline and thumbnail generation are non-fatal: their failures
//! are logged and recorded in their own fields, never promoted to a
//! job failure.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use clipmill_ledger::UsageLedger;
use clipmill_models::{ClipStatus, LedgerEntryType, SmartCropStatus};
use clipmill_queue::{JobAttempt, JobError, JobHandler, ProgressHandle, RenderClipJob};
use clipmill_store::{ClipStore, VideoStore};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::services::{
    CaptionTranslator, Notifier, ObjectStorage, ProgressReporter, ReframeDetector, RenderEngine,
    RenderOutput, RenderRequest,
};

/// Collaborators and stores the render stage operates on.
pub struct RenderDeps {
    pub videos: Arc<dyn VideoStore>,
    pub clips: Arc<dyn ClipStore>,
    pub ledger: Arc<UsageLedger>,
    pub storage: Arc<dyn ObjectStorage>,
    pub engine: Arc<dyn RenderEngine>,
    pub reframe_detector: Arc<dyn ReframeDetector>,
    pub translator: Arc<dyn CaptionTranslator>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct RenderStage {
    deps: RenderDeps,
    config: PipelineConfig,
}

/// Whether this job currently holds an unrefunded debit. Spans
/// attempts: a retried attempt finds the earlier debit in the ledger
/// and must not debit again.
struct Billing {
    held: bool,
}

impl RenderStage {
    pub fn new(deps: RenderDeps, config: PipelineConfig) -> Self {
        Self { deps, config }
    }

    /// A debit tagged with this correlation id that has not been
    /// refunded yet.
    async fn has_open_debit(&self, workspace_id: &str, correlation_id: &str) -> bool {
        let entries = self.deps.ledger.entries(workspace_id).await;
        let matches = |entry_type: LedgerEntryType| {
            entries.iter().any(|e| {
                e.entry_type == entry_type && e.correlation_id.as_deref() == Some(correlation_id)
            })
        };
        matches(LedgerEntryType::Debit) && !matches(LedgerEntryType::Refund)
    }

    async fn run(
        &self,
        job: &RenderClipJob,
        logger: &JobLogger,
        progress: &ProgressHandle<RenderClipJob>,
        billing: &mut Billing,
    ) -> PipelineResult<()> {
        let clip = self.deps.clips.get(&job.clip_id).await?;
        if clip.status.is_delivered() {
            logger.log_progress("Clip already delivered, nothing to do");
            return Ok(());
        }
        progress.report(5).await;

        match clip.status {
            ClipStatus::Detected => {
                self.deps
                    .clips
                    .transition(&job.clip_id, ClipStatus::Generating)
                    .await?;
            }
            // A retried attempt resumes from generating.
            ClipStatus::Generating => {}
            other => {
                return Err(PipelineError::validation(format!(
                    "clip {} is {other}, cannot render",
                    job.clip_id
                )));
            }
        }
        progress.report(10).await;

        if job.credit_cost > 0 {
            let correlation_id = job.clip_id.as_str();
            if self.has_open_debit(&job.workspace_id, correlation_id).await {
                logger.log_progress("Debit already held from an earlier attempt");
                billing.held = true;
            } else {
                self.deps
                    .ledger
                    .debit(
                        &job.workspace_id,
                        job.credit_cost as i64,
                        correlation_id,
                        &format!("Render clip {}", job.clip_id),
                    )
                    .await?;
                billing.held = true;
            }
        }

        // Caption preparation: translated words when available, with
        // language-specific style overrides.
        let mut captions = job.captions.clone();
        let mut style = job.caption_style.clone();
        if let Some(lang) = &job.target_language {
            if captions.is_some() {
                match self
                    .deps
                    .translator
                    .translated_captions(&job.clip_id, lang)
                    .await
                {
                    Ok(Some(words)) => captions = Some(words),
                    Ok(None) => {
                        logger.log_progress("No translated captions available, using originals")
                    }
                    Err(e) => logger.log_warning(&format!(
                        "Caption translation lookup failed, using originals: {e}"
                    )),
                }
                style = style.map(|s| s.for_language(lang));
            }
        }

        // Validate before touching the engine.
        if job.end_time <= job.start_time {
            return Err(PipelineError::validation(format!(
                "empty time range {}..{}",
                job.start_time, job.end_time
            )));
        }
        let video = self.deps.videos.get(&job.video_id).await?;
        if video.duration_seconds > 0 && job.end_time > video.duration_seconds {
            return Err(PipelineError::validation(format!(
                "clip end {}s exceeds source duration {}s",
                job.end_time, video.duration_seconds
            )));
        }
        let source_key = video.source_key.clone().ok_or_else(|| {
            PipelineError::validation(format!("video {} has no stored source media", job.video_id))
        })?;
        progress.report(20).await;

        // Engine progress (0-100) lands in this job's 20-85% range.
        let reporter = {
            let handle = progress.clone();
            ProgressReporter::new(move |p| {
                handle.report_sync(20 + (p.min(100) as u32 * 65 / 100) as u8)
            })
        };
        let request = RenderRequest {
            source_key,
            start_time: job.start_time,
            end_time: job.end_time,
            aspect_ratio: job.aspect_ratio,
            quality: job.quality,
            captions,
            caption_style: style,
            watermark: job.watermark,
            intro_title: job.intro_title.clone(),
            emoji_transcript: job.emoji_transcript.clone(),
            split_screen_key: job.split_screen.clone(),
            dest_prefix: format!("clips/{}", job.clip_id),
        };
        let started = Instant::now();
        let output = self.deps.engine.render(&request, &reporter).await?;
        metrics::record_clip_rendered(started.elapsed().as_secs_f64());
        self.deps
            .clips
            .set_rendered(&job.clip_id, &output.rendered_key, Some(&output.raw_key))
            .await?;
        progress.report(85).await;

        if job.smart_crop_enabled {
            self.smart_crop(job, &output, logger).await;
        }

        match self.deps.engine.thumbnail(&output.rendered_key).await {
            Ok(thumb) => {
                if let Err(e) = self.deps.clips.set_thumbnail(&job.clip_id, &thumb.key).await {
                    logger.log_warning(&format!("Could not persist thumbnail: {e}"));
                }
            }
            Err(e) => logger.log_warning(&format!("Thumbnail generation failed: {e}")),
        }
        progress.report(95).await;

        self.deps
            .clips
            .transition(&job.clip_id, ClipStatus::Ready)
            .await?;
        progress.report(100).await;

        if self.deps.clips.all_delivered(&job.video_id).await? {
            if let Err(e) = self
                .deps
                .notifier
                .notify(
                    "all_clips_ready",
                    &job.user_id,
                    serde_json::json!({
                        "video_id": job.video_id,
                        "workspace_id": job.workspace_id,
                    }),
                )
                .await
            {
                logger.log_warning(&format!("All-clips-ready notification failed: {e}"));
            }
        }
        Ok(())
    }

    /// Reframing sub-pipeline. Runs entirely behind a non-propagating
    /// boundary; outcomes land in `smart_crop_status` only.
    async fn smart_crop(&self, job: &RenderClipJob, output: &RenderOutput, logger: &JobLogger) {
        let result: PipelineResult<()> = async {
            self.deps
                .clips
                .set_smart_crop(&job.clip_id, SmartCropStatus::Pending, None)
                .await?;
            let raw_url = self
                .deps
                .storage
                .signed_url(&output.raw_key, self.config.signed_url_ttl)
                .await?;
            self.deps
                .clips
                .set_smart_crop(&job.clip_id, SmartCropStatus::Processing, None)
                .await?;

            let plan = self.deps.reframe_detector.plan(&raw_url).await?;
            if plan.is_empty() {
                logger.log_progress("Reframe plan empty, skipping smart crop");
                self.deps
                    .clips
                    .set_smart_crop(&job.clip_id, SmartCropStatus::Skipped, None)
                    .await?;
                return Ok(());
            }

            let reframed = self
                .deps
                .engine
                .reframe(&raw_url, &plan, &format!("clips/{}", job.clip_id))
                .await?;
            self.deps
                .clips
                .set_smart_crop(&job.clip_id, SmartCropStatus::Done, Some(&reframed.key))
                .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            logger.log_warning(&format!("Smart crop failed: {e}"));
            if let Err(e) = self
                .deps
                .clips
                .set_smart_crop(&job.clip_id, SmartCropStatus::Failed, None)
                .await
            {
                logger.log_warning(&format!("Could not record smart crop failure: {e}"));
            }
        }
    }

    /// Terminal failure path: fail the clip and refund the held debit.
    async fn handle_terminal_failure(
        &self,
        job: &RenderClipJob,
        err: &PipelineError,
        billing: &Billing,
        logger: &JobLogger,
    ) {
        logger.log_error(&format!("Render failed terminally: {err}"));
        metrics::record_clip_failed();

        if let Err(e) = self.deps.clips.fail(&job.clip_id, &err.to_string()).await {
            logger.log_warning(&format!("Could not mark clip failed: {e}"));
        }

        if billing.held {
            self.deps
                .ledger
                .refund(
                    &job.workspace_id,
                    job.credit_cost as i64,
                    job.clip_id.as_str(),
                    "Clip render failed",
                )
                .await;
        }
    }
}

#[async_trait]
impl JobHandler<RenderClipJob> for RenderStage {
    async fn handle(
        &self,
        attempt: &JobAttempt<RenderClipJob>,
        progress: &ProgressHandle<RenderClipJob>,
    ) -> Result<(), JobError> {
        let logger = JobLogger::new(&attempt.job_id, "render");
        logger.log_start(&format!(
            "Rendering clip {} (attempt {}/{})",
            attempt.payload.clip_id, attempt.attempts_made, attempt.max_attempts
        ));

        let mut billing = Billing { held: false };
        match self
            .run(&attempt.payload, &logger, progress, &mut billing)
            .await
        {
            Ok(()) => {
                logger.log_completion(&format!("Clip {} ready", attempt.payload.clip_id));
                Ok(())
            }
            Err(e) => {
                if !e.is_retryable() || attempt.is_final_attempt() {
                    self.handle_terminal_failure(&attempt.payload, &e, &billing, &logger)
                        .await;
                } else {
                    // Clip status untouched and the debit stays held;
                    // the next attempt resumes from `generating` and
                    // skips re-debiting.
                    logger.log_warning(&format!("Attempt failed, queue will retry: {e}"));
                }
                Err(e.into())
            }
        }
    }
}
