//! Job queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use reelsync_models::{JobRequest, JobResult};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::source::{JobSource, ReceivedJob};

/// Stream field carrying the JSON job payload.
const JOB_FIELD: &str = "job";
/// Stream field carrying the JSON result payload.
const RESULT_FIELD: &str = "result";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name (the host's subscription)
    pub consumer_group: String,
    /// Consumer name within the group
    pub consumer_name: String,
    /// Stream that receives job results (the host's result topic)
    pub result_stream: String,
    /// Pending messages idle for longer than this are reclaimed
    pub claim_idle: Duration,
    /// Messages delivered more often than this are dropped
    pub max_deliveries: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "reelsync:jobs".to_string(),
            consumer_group: "reelsync:workers".to_string(),
            consumer_name: "worker".to_string(),
            result_stream: "reelsync:results".to_string(),
            claim_idle: Duration::from_secs(3600),
            max_deliveries: 5,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            consumer_name: std::env::var("QUEUE_CONSUMER_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or(defaults.consumer_name),
            result_stream: std::env::var("QUEUE_RESULT_STREAM")
                .unwrap_or(defaults.result_stream),
            claim_idle: std::env::var("QUEUE_CLAIM_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_idle),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_deliveries),
        }
    }

    /// Bind the config to a subscription (consumer group).
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.consumer_group = subscription.into();
        self
    }

    /// Bind the config to a result topic (result stream).
    pub fn with_result_stream(mut self, stream: impl Into<String>) -> Self {
        self.result_stream = stream.into();
        self
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Start at 0 so jobs submitted before the first worker boots are seen.
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Submit a job request. Used by operators and tests.
    pub async fn enqueue(&self, request: &JobRequest) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(request)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(JOB_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(message_id = %message_id, stream = %self.config.stream_name, "Enqueued job");
        Ok(message_id)
    }

    /// Receive at most one job, preferring stale pending messages.
    pub async fn receive_one(&self, block: Duration) -> QueueResult<Option<ReceivedJob>> {
        let mut conn = self.connection().await?;

        if let Some(job) = self.claim_stale(&mut conn).await? {
            return Ok(Some(job));
        }

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(entry) = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next()
        else {
            return Ok(None);
        };

        self.decode(entry, 1).await.map(Some)
    }

    /// Take over the oldest pending message if it has been idle long enough.
    async fn claim_stale(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> QueueResult<Option<ReceivedJob>> {
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(conn)
            .await?;

        let Some(oldest) = pending.ids.into_iter().next() else {
            return Ok(None);
        };

        let min_idle_ms = self.config.claim_idle.as_millis() as usize;
        if oldest.last_delivered_ms < min_idle_ms {
            return Ok(None);
        }

        let deliveries = oldest.times_delivered as u64 + 1;
        if deliveries > self.config.max_deliveries {
            warn!(
                message_id = %oldest.id,
                deliveries = oldest.times_delivered,
                "Dropping message after too many deliveries"
            );
            self.ack(&oldest.id).await?;
            return Ok(None);
        }

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(min_idle_ms)
            .arg(&oldest.id)
            .query_async(conn)
            .await?;

        match claimed.ids.into_iter().next() {
            Some(entry) => {
                info!(message_id = %entry.id, deliveries, "Reclaimed pending job");
                self.decode(entry, deliveries).await.map(Some)
            }
            // Another consumer won the claim.
            None => Ok(None),
        }
    }

    /// Parse a stream entry. Malformed payloads are acked so they are never redelivered.
    async fn decode(&self, entry: StreamId, deliveries: u64) -> QueueResult<ReceivedJob> {
        let message_id = entry.id.clone();

        let parsed = match entry.map.get(JOB_FIELD) {
            Some(redis::Value::BulkString(payload)) => parse_payload(payload),
            Some(redis::Value::SimpleString(payload)) => parse_payload(payload.as_bytes()),
            _ => Err(format!("missing '{JOB_FIELD}' field")),
        };

        match parsed {
            Ok(request) => {
                debug!(message_id = %message_id, "Consumed job from stream");
                Ok(ReceivedJob {
                    message_id,
                    request,
                    deliveries,
                })
            }
            Err(reason) => {
                warn!(message_id = %message_id, reason = %reason, "Failed to parse job payload");
                if let Err(e) = self.ack(&message_id).await {
                    warn!(message_id = %message_id, error = %e, "Failed to ack malformed message");
                }
                Err(QueueError::malformed(message_id, reason))
            }
        }
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id, "Acknowledged job");
        Ok(())
    }

    /// Append a result message to the result stream.
    pub async fn publish(&self, result: &JobResult) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(result)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.result_stream)
            .arg("*")
            .arg(RESULT_FIELD)
            .arg(&payload)
            .arg("status")
            .arg(result.status.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        info!(
            job_id = %result.job_id,
            status = %result.status,
            stream = %self.config.result_stream,
            "Published job result"
        );
        Ok(message_id)
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = redis::cmd("XLEN")
            .arg(&self.config.stream_name)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

fn parse_payload(bytes: &[u8]) -> Result<JobRequest, String> {
    serde_json::from_slice::<JobRequest>(bytes).map_err(|e| e.to_string())
}

#[async_trait]
impl JobSource for JobQueue {
    async fn receive(&self, wait: Duration) -> QueueResult<Option<ReceivedJob>> {
        self.receive_one(wait).await
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        JobQueue::ack(self, message_id).await
    }

    async fn publish_result(&self, result: &JobResult) -> QueueResult<()> {
        self.publish(result).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsync_models::ClipInput;

    #[test]
    fn test_config_bindings() {
        let config = QueueConfig::default()
            .with_subscription("sub-a")
            .with_result_stream("results-a");
        assert_eq!(config.consumer_group, "sub-a");
        assert_eq!(config.result_stream, "results-a");
        assert_eq!(config.stream_name, "reelsync:jobs");
    }

    #[test]
    fn test_parse_payload_accepts_string_and_object_inputs() {
        let payload = br#"{
            "bucket": "media",
            "productionId": "p-1",
            "inputs": [
                "cams/a.mp4:portrait:0",
                {"key": "cams/b.mp4", "orientation": "landscape", "offset": "2.5"}
            ],
            "outputs": ["out/final.mp4"]
        }"#;

        let request = parse_payload(payload).unwrap();
        assert_eq!(request.bucket, "media");
        assert_eq!(request.production_id.as_deref(), Some("p-1"));
        assert!(matches!(request.inputs[0], ClipInput::Spec(_)));
        assert!(matches!(request.inputs[1], ClipInput::Object { .. }));
    }

    #[test]
    fn test_parse_payload_rejects_garbage() {
        assert!(parse_payload(b"not json").is_err());
        assert!(parse_payload(br#"{"inputs": []}"#).is_err());
    }

    #[test]
    fn test_new_rejects_bad_url() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..QueueConfig::default()
        };
        assert!(matches!(
            JobQueue::new(config),
            Err(QueueError::ConnectionFailed(_))
        ));
    }
}
