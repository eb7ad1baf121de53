//! S3 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use reelsync_models::RemoteKey;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Configuration for the S3 client.
///
/// With no explicit keys the default AWS credential chain is used
/// (environment, profile, instance metadata).
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Custom endpoint (R2, MinIO, GCS interop); `None` for AWS
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let access_key_id = non_empty_env("S3_ACCESS_KEY_ID");
        let secret_access_key = non_empty_env("S3_SECRET_ACCESS_KEY");
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::config_error(
                "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
            ));
        }

        Ok(Self {
            endpoint_url: non_empty_env("S3_ENDPOINT_URL"),
            access_key_id,
            secret_access_key,
            region: non_empty_env("S3_REGION").unwrap_or_else(|| "auto".to_string()),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// S3-compatible storage client. Not bound to a bucket; each key carries one.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
}

impl S3Client {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(id, secret, None, None, "reelsync-env")),
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                Builder::from(&shared)
            }
        };

        builder = builder.region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()?).await
    }

    /// Check whether an object exists.
    pub async fn exists(&self, key: &RemoteKey) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&key.bucket)
            .key(&key.path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e.to_string()) => Ok(false),
            Err(e) => Err(StorageError::download_failed(key.to_string(), e)),
        }
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("NoSuchKey") || message.contains("NotFound") || message.contains("404")
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn download_file(&self, key: &RemoteKey, dest: &Path) -> StorageResult<u64> {
        debug!("Downloading {} to {}", key, dest.display());

        let response = self
            .client
            .get_object()
            .bucket(&key.bucket)
            .key(&key.path)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_not_found(&message) {
                    StorageError::not_found(key.to_string())
                } else {
                    StorageError::download_failed(key.to_string(), message)
                }
            })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream the body to disk; source recordings can be several GB.
        let mut body = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(key.to_string(), e))?;
        file.flush().await?;
        file.sync_all().await?;

        info!("Downloaded {} ({} bytes) to {}", key, written, dest.display());
        Ok(written)
    }

    async fn upload_file(
        &self,
        path: &Path,
        key: &RemoteKey,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| {
                StorageError::upload_failed(key.to_string(), format!("{}: {e}", path.display()))
            })?;

        self.client
            .put_object()
            .bucket(&key.bucket)
            .key(&key.path)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(key.to_string(), e))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }
}
