//! Host metadata: which subscription to consume and where to report.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};

/// Subscription value that puts the host into a debug hold instead of consuming.
pub const DEBUG_SUBSCRIPTION: &str = "DEBUG";

/// Result topic used when the host does not name one.
pub const DEFAULT_RESULT_TOPIC: &str = "production-results";

const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// What the hosting environment tells the worker about its assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMetadata {
    pub project_id: String,
    pub subscription_id: String,
    pub result_topic_id: String,
}

impl HostMetadata {
    /// The host was provisioned for interactive debugging, not for a job.
    pub fn is_debug_hold(&self) -> bool {
        self.subscription_id == DEBUG_SUBSCRIPTION
    }
}

/// Source of [`HostMetadata`].
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> WorkerResult<HostMetadata>;
}

/// Metadata server client with environment overrides.
///
/// `PROJECT_ID`, `SUBSCRIPTION_ID` and `RESULT_TOPIC_ID` win over the server;
/// the server is only contacted for fields the environment leaves unset.
pub struct MetadataClient {
    client: Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| WorkerError::config_error(format!("metadata client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> WorkerResult<Self> {
        Self::new(
            std::env::var("METADATA_BASE_URL").unwrap_or_else(|_| DEFAULT_METADATA_URL.to_string()),
        )
    }

    /// Fetch one value. A missing attribute is `None`, not an error.
    async fn get(&self, path: &str) -> WorkerResult<Option<String>> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| WorkerError::lifecycle(format!("metadata request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "metadata attribute not set");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(WorkerError::lifecycle(format!(
                "metadata server returned {} for {}",
                response.status(),
                path
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| WorkerError::lifecycle(format!("metadata body: {e}")))?;
        Ok(Some(text.trim().to_string()).filter(|s| !s.is_empty()))
    }

    async fn field(&self, env_key: &str, path: &str) -> WorkerResult<Option<String>> {
        match env_value(env_key) {
            Some(value) => Ok(Some(value)),
            None => self.get(path).await,
        }
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn fetch(&self) -> WorkerResult<HostMetadata> {
        let subscription_id = self
            .field("SUBSCRIPTION_ID", "instance/attributes/subscription-id")
            .await?
            .ok_or_else(|| WorkerError::lifecycle("host has no subscription id"))?;
        let project_id = self
            .field("PROJECT_ID", "project/project-id")
            .await?
            .unwrap_or_default();
        let result_topic_id = self
            .field("RESULT_TOPIC_ID", "instance/attributes/result-topic-id")
            .await?
            .unwrap_or_else(|| DEFAULT_RESULT_TOPIC.to_string());

        let metadata = HostMetadata {
            project_id,
            subscription_id,
            result_topic_id,
        };
        info!(
            project = %metadata.project_id,
            subscription = %metadata.subscription_id,
            result_topic = %metadata.result_topic_id,
            "resolved host metadata"
        );
        Ok(metadata)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
