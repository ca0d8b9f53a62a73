//! Progress events via Redis Pub/Sub.
//!
//! The queue itself is authoritative for progress; this channel is a
//! best-effort fan-out so UI consumers can stream updates instead of
//! polling job status.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QueueResult;
use crate::job::JobId;

/// Progress event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Job ID
    pub job_id: JobId,
    #[serde(flatten)]
    pub kind: ProgressEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEventKind {
    Progress { percent: u8 },
    Done,
    Error { message: String },
}

/// Channel for publishing/subscribing to progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("clipmill:progress:{}", job_id)
    }

    /// Publish a progress event.
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("Publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Publish a progress update.
    pub async fn progress(&self, job_id: &JobId, percent: u8) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            kind: ProgressEventKind::Progress { percent },
        })
        .await
    }

    /// Publish done message.
    pub async fn done(&self, job_id: &JobId) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            kind: ProgressEventKind::Done,
        })
        .await
    }

    /// Publish error message.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        self.publish(&ProgressEvent {
            job_id: job_id.clone(),
            kind: ProgressEventKind::Error {
                message: message.into(),
            },
        })
        .await
    }

    /// Subscribe to progress events for a job.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>>
    {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
