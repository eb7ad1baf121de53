//! The seam between the worker lifecycle and whatever delivers jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelsync_models::{JobRequest, JobResult};

use crate::error::QueueResult;

/// A job message taken from the queue but not yet acknowledged.
#[derive(Debug, Clone)]
pub struct ReceivedJob {
    pub message_id: String,
    pub request: JobRequest,
    /// How many times the message has been delivered, this one included.
    pub deliveries: u64,
}

/// Source of at most one job per receive call.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Wait up to `wait` for a job. `Ok(None)` means nothing arrived.
    async fn receive(&self, wait: Duration) -> QueueResult<Option<ReceivedJob>>;

    /// Mark the message as handled so it is never redelivered.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Report the final state of a job.
    async fn publish_result(&self, result: &JobResult) -> QueueResult<()>;
}

#[async_trait]
impl<T: JobSource + ?Sized> JobSource for Arc<T> {
    async fn receive(&self, wait: Duration) -> QueueResult<Option<ReceivedJob>> {
        (**self).receive(wait).await
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        (**self).ack(message_id).await
    }

    async fn publish_result(&self, result: &JobResult) -> QueueResult<()> {
        (**self).publish_result(result).await
    }
}
