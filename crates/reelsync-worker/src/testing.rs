//! In-memory implementations of the worker's seams, for tests.
//!
//! Compiled into unit tests, and into the library when the `testing`
//! feature is enabled.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reelsync_media::{MediaError, MediaResult, RenderEngine, RenderPass};
use reelsync_models::{JobResult, RemoteKey};
use reelsync_queue::{JobSource, QueueError, QueueResult, ReceivedJob};
use reelsync_storage::{ObjectStore, StorageError, StorageResult};

use crate::error::WorkerResult;
use crate::gpu::GpuProbe;
use crate::lifecycle::HostControl;
use crate::metadata::{HostMetadata, MetadataSource, DEFAULT_RESULT_TOPIC};

/// Object store backed by a map of qualified keys to bytes.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl MemoryStore {
    pub fn insert(&self, qualified: &str, bytes: &[u8]) {
        lock(&self.objects).insert(qualified.to_string(), bytes.to_vec());
    }

    pub fn get(&self, qualified: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(qualified).cloned()
    }

    /// Number of remote fetches served so far.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download_file(&self, key: &RemoteKey, dest: &Path) -> StorageResult<u64> {
        let bytes = self
            .get(&key.qualified())
            .ok_or_else(|| StorageError::not_found(key.qualified()))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn upload_file(&self, path: &Path, key: &RemoteKey, _content_type: &str) -> StorageResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed(key.qualified(), "uploads disabled"));
        }
        let bytes = tokio::fs::read(path).await?;
        self.insert(&key.qualified(), &bytes);
        Ok(())
    }
}

/// Render engine that writes each pass name into its output file.
#[derive(Default)]
pub struct FakeEngine {
    duration: f64,
    fail_on: Option<String>,
    skip_output: bool,
    rendered: Mutex<Vec<String>>,
    codecs: Mutex<Vec<String>>,
}

impl FakeEngine {
    /// Every probed source reports `seconds`.
    pub fn with_duration(seconds: f64) -> Self {
        Self {
            duration: seconds,
            ..Self::default()
        }
    }

    /// Fail the pass with this name as the engine would on a non-zero exit.
    pub fn failing_on(mut self, pass: &str) -> Self {
        self.fail_on = Some(pass.to_string());
        self
    }

    /// Report success without writing anything.
    pub fn without_output(mut self) -> Self {
        self.skip_output = true;
        self
    }

    pub fn rendered(&self) -> Vec<String> {
        lock(&self.rendered).clone()
    }

    /// Distinct video codecs requested, in first-use order.
    pub fn codecs(&self) -> Vec<String> {
        lock(&self.codecs).clone()
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        Ok(self.duration)
    }

    async fn render(&self, pass: &RenderPass) -> MediaResult<()> {
        pass.to_command(&pass.output)?;
        lock(&self.rendered).push(pass.name.clone());
        {
            let mut codecs = lock(&self.codecs);
            if !codecs.contains(&pass.encoding.codec) {
                codecs.push(pass.encoding.codec.clone());
            }
        }
        if self.fail_on.as_deref() == Some(pass.name.as_str()) {
            return Err(MediaError::ffmpeg_failed(
                format!("{} failed", pass.name),
                Some("Conversion failed!".to_string()),
                Some(1),
            ));
        }
        if !self.skip_output {
            tokio::fs::write(&pass.output, pass.name.as_bytes()).await?;
        }
        Ok(())
    }
}

/// Accelerator lookup with a fixed answer.
pub struct StaticGpu(pub Vec<String>);

impl StaticGpu {
    pub fn present() -> Self {
        Self(vec!["GPU 0: Test Accelerator".to_string()])
    }

    pub fn absent() -> Self {
        Self(Vec::new())
    }
}

#[async_trait]
impl GpuProbe for StaticGpu {
    async fn devices(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Metadata source with a fixed answer.
pub struct StaticMetadata(pub HostMetadata);

impl StaticMetadata {
    pub fn subscription(subscription: &str) -> Self {
        Self(HostMetadata {
            project_id: "test-project".to_string(),
            subscription_id: subscription.to_string(),
            result_topic_id: DEFAULT_RESULT_TOPIC.to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn fetch(&self) -> WorkerResult<HostMetadata> {
        Ok(self.0.clone())
    }
}

/// Host that records what the controller asked of it instead of acting.
#[derive(Default)]
pub struct RecordingHost {
    sleeps: Mutex<Vec<Duration>>,
    shutdowns: AtomicUsize,
}

impl RecordingHost {
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().into_iter().sum()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostControl for RecordingHost {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }

    async fn shutdown(&self) -> WorkerResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What a [`FakeJobSource`] hands out on its single receive.
pub enum Queued {
    Job(ReceivedJob),
    Malformed(String),
    Nothing,
}

/// Job source holding at most one message.
pub struct FakeJobSource {
    next: Mutex<Option<Queued>>,
    acked: Mutex<Vec<String>>,
    results: Mutex<Vec<JobResult>>,
}

impl FakeJobSource {
    pub fn new(queued: Queued) -> Self {
        Self {
            next: Mutex::new(Some(queued)),
            acked: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn acked(&self) -> Vec<String> {
        lock(&self.acked).clone()
    }

    pub fn results(&self) -> Vec<JobResult> {
        lock(&self.results).clone()
    }
}

#[async_trait]
impl JobSource for FakeJobSource {
    async fn receive(&self, _wait: Duration) -> QueueResult<Option<ReceivedJob>> {
        match lock(&self.next).take() {
            Some(Queued::Job(job)) => Ok(Some(job)),
            Some(Queued::Malformed(id)) => {
                lock(&self.acked).push(id.clone());
                Err(QueueError::malformed(id, "expected value at line 1 column 1"))
            }
            Some(Queued::Nothing) | None => Ok(None),
        }
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        lock(&self.acked).push(message_id.to_string());
        Ok(())
    }

    async fn publish_result(&self, result: &JobResult) -> QueueResult<()> {
        lock(&self.results).push(result.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
