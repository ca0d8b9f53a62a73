//! Pipeline configuration.

use std::time::Duration;

use clipmill_queue::QueueConfig;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Workers serving the ingestion queue.
    pub ingest_concurrency: usize,
    /// Workers serving the render queue. Keep conservative relative to
    /// the render engine's own concurrency limits.
    pub render_concurrency: usize,
    /// Worker idle poll interval.
    pub poll_interval: Duration,
    /// Interval between queue GC sweeps.
    pub cleanup_interval: Duration,
    /// Bounded wait on network-bound source acquisition.
    pub acquire_timeout: Duration,
    /// TTL for signed storage URLs handed to collaborators.
    pub signed_url_ttl: Duration,
    /// Retry/backoff/retention settings shared by both queues.
    pub queue: QueueConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest_concurrency: 2,
            render_concurrency: 2,
            poll_interval: Duration::from_millis(100),
            cleanup_interval: Duration::from_secs(15 * 60),
            acquire_timeout: Duration::from_secs(600),
            signed_url_ttl: Duration::from_secs(3600),
            queue: QueueConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let secs = |var: &str, default: u64| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        Self {
            ingest_concurrency: std::env::var("PIPELINE_INGEST_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            render_concurrency: std::env::var("PIPELINE_RENDER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            poll_interval: Duration::from_millis(secs("PIPELINE_POLL_INTERVAL_MS", 100)),
            cleanup_interval: Duration::from_secs(secs("PIPELINE_CLEANUP_INTERVAL_SECS", 15 * 60)),
            acquire_timeout: Duration::from_secs(secs("PIPELINE_ACQUIRE_TIMEOUT_SECS", 600)),
            signed_url_ttl: Duration::from_secs(secs("PIPELINE_SIGNED_URL_TTL_SECS", 3600)),
            queue: QueueConfig::from_env(),
        }
    }
}
