//! Runs one composition job from descriptor to delivered artifact.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reelsync_media::{
    resolve_layout, CompositionPipeline, CompositionRequest, Layout, RenderEngine,
    SequentialTiming, SourceClip,
};
use reelsync_models::{JobDescriptor, JobMode};
use reelsync_storage::{content_type_for, ObjectStore};
use tokio::fs;
use tracing::{info, warn, Instrument};

use crate::acquisition::InputCache;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Where a job works and what it does with the result.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub workspace: PathBuf,
    pub mode: JobMode,
    pub debug_output_dir: PathBuf,
}

impl JobContext {
    /// The job ID must already have passed [`reelsync_models::JobId::validate`].
    pub fn for_job(config: &WorkerConfig, job: &JobDescriptor) -> Self {
        Self {
            workspace: config.work_dir.join(job.id.as_str()),
            mode: job.mode,
            debug_output_dir: config.debug_output_dir.clone(),
        }
    }

    /// Directory holding the finished artifact, apart from intermediates.
    pub fn final_dir(&self) -> PathBuf {
        self.workspace.join("final")
    }
}

/// A delivered artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Uploaded to remote storage under this qualified key.
    Uploaded(String),
    /// Kept on local disk (debug mode).
    Local(PathBuf),
}

impl Delivery {
    pub fn location(&self) -> String {
        match self {
            Delivery::Uploaded(key) => key.clone(),
            Delivery::Local(path) => path.display().to_string(),
        }
    }
}

/// Composition job executor.
pub struct JobRunner {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    cache: InputCache<Arc<dyn ObjectStore>>,
    engine: Arc<dyn RenderEngine>,
    accelerator: AtomicBool,
}

impl JobRunner {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn RenderEngine>,
    ) -> Self {
        let cache = InputCache::new(store.clone(), config.cache_dir.clone());
        Self {
            config,
            store,
            cache,
            engine,
            accelerator: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Record whether an accelerator was detected; it selects the encoder
    /// unless `WORKER_USE_NVENC` overrides it.
    pub fn set_accelerator(&self, present: bool) {
        self.accelerator.store(present, Ordering::SeqCst);
    }

    pub fn pipeline(&self) -> CompositionPipeline<Arc<dyn RenderEngine>> {
        let accelerator = self.accelerator.load(Ordering::SeqCst);
        CompositionPipeline::new(self.engine.clone(), self.config.composition(accelerator))
    }

    /// Everything that can be rejected without touching storage or the engine.
    pub fn validate(&self, job: &JobDescriptor) -> WorkerResult<Layout> {
        job.id.validate()?;
        let config = self.config.composition(false);
        config.validate()?;
        let layout = resolve_layout(&job.orientations())?;

        if layout.is_sequential() {
            let segment = job.segment_seconds.unwrap_or(config.segment_seconds);
            SequentialTiming::compute(&job.offsets(), segment, config.fade_seconds)?;
        }

        Ok(layout)
    }

    /// Validate, fetch, render, verify and deliver.
    pub async fn run(&self, job: &JobDescriptor) -> WorkerResult<Delivery> {
        let layout = self.validate(job)?;
        let logger = JobLogger::new(&job.id, layout.name());
        let ctx = JobContext::for_job(&self.config, job);

        let result = self
            .execute(job, layout, &ctx, &logger)
            .instrument(logger.span())
            .await;

        match ctx.mode {
            JobMode::Production => {
                if let Err(e) = fs::remove_dir_all(&ctx.workspace).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(workspace = %ctx.workspace.display(), error = %e, "failed to remove workspace");
                    }
                }
            }
            JobMode::Debug => {
                info!(workspace = %ctx.workspace.display(), "keeping workspace for inspection");
            }
        }

        if let Err(e) = &result {
            logger.log_error(&e.to_string());
        }
        result
    }

    async fn execute(
        &self,
        job: &JobDescriptor,
        layout: Layout,
        ctx: &JobContext,
        logger: &JobLogger,
    ) -> WorkerResult<Delivery> {
        logger.log_start(job.clips.len(), ctx.mode.as_str());

        let inputs = self
            .cache
            .resolve_all(&job.clips, &ctx.workspace.join("inputs"))
            .await?;
        logger.log_progress("inputs ready");

        let clips = job
            .clips
            .iter()
            .zip(inputs)
            .map(|(clip, path)| SourceClip {
                path,
                orientation: clip.orientation,
                offset: clip.offset,
            })
            .collect();

        let final_dir = ctx.final_dir();
        fs::create_dir_all(&final_dir).await?;

        let request = CompositionRequest {
            layout,
            clips,
            workdir: ctx.workspace.clone(),
            output: final_dir.join(job.output.file_name()),
            segment_seconds: job.segment_seconds,
        };

        let pipeline = self.pipeline();
        info!(codec = %pipeline.config().encoding.codec, "encoder selected");
        let output = pipeline.execute(&request).await?;
        verify_artifact(&output.artifact).await?;
        logger.log_progress("render complete");

        let delivery = match ctx.mode {
            JobMode::Debug => {
                fs::create_dir_all(&ctx.debug_output_dir).await?;
                let dest = ctx
                    .debug_output_dir
                    .join(format!("{}_{}", job.id, job.output.file_name()));
                fs::copy(&output.artifact, &dest).await?;
                Delivery::Local(dest)
            }
            JobMode::Production => {
                self.store
                    .upload_file(
                        &output.artifact,
                        &job.output,
                        content_type_for(&output.artifact),
                    )
                    .await?;
                Delivery::Uploaded(job.output.qualified())
            }
        };

        logger.log_completion(&delivery.location());
        Ok(delivery)
    }
}

/// The artifact must exist and be non-empty after a successful pipeline.
pub async fn verify_artifact(path: &Path) -> WorkerResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(WorkerError::integrity(format!(
            "output artifact is empty: {}",
            path.display()
        ))),
        Err(_) => Err(WorkerError::integrity(format!(
            "output artifact missing after pipeline claimed success: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, MemoryStore};
    use reelsync_models::{ClipRef, JobId, Orientation, RemoteKey};
    use tempfile::TempDir;

    fn config(dir: &Path, mode: JobMode) -> WorkerConfig {
        WorkerConfig {
            work_dir: dir.join("work"),
            cache_dir: dir.join("cache"),
            debug_output_dir: dir.join("out"),
            log_dir: dir.join("logs"),
            mode,
            logo_path: None,
            ..WorkerConfig::default()
        }
    }

    fn job(specs: &[(&str, Orientation, f64)], mode: JobMode) -> JobDescriptor {
        let clips = specs
            .iter()
            .map(|(p, o, off)| ClipRef::new(RemoteKey::new("media", *p).unwrap(), *o, *off).unwrap())
            .collect();
        JobDescriptor::new(clips, RemoteKey::new("media", "out/final.mp4").unwrap(), mode).unwrap()
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.insert("media/a.mp4", b"A");
        store.insert("media/b.mp4", b"B");
        store.insert("media/c.mp4", b"C");
        store
    }

    #[tokio::test]
    async fn test_production_uploads_and_cleans_workspace() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store();
        let engine = Arc::new(FakeEngine::with_duration(30.0));
        let runner = JobRunner::new(config(dir.path(), JobMode::Production), store.clone(), engine.clone());
        let job = job(
            &[("a.mp4", Orientation::Portrait, 0.0), ("b.mp4", Orientation::Portrait, 2.0)],
            JobMode::Production,
        );

        let delivery = runner.run(&job).await.unwrap();

        assert_eq!(delivery, Delivery::Uploaded("media/out/final.mp4".into()));
        assert!(store.get("media/out/final.mp4").is_some());
        assert!(!dir.path().join("work").join(job.id.as_str()).exists());
        assert_eq!(engine.rendered(), vec!["compose".to_string()]);
    }

    #[tokio::test]
    async fn test_debug_keeps_artifacts_and_skips_upload() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store();
        let engine = Arc::new(FakeEngine::with_duration(30.0));
        let runner = JobRunner::new(config(dir.path(), JobMode::Debug), store.clone(), engine.clone());
        let job = job(
            &[
                ("a.mp4", Orientation::Landscape, 0.0),
                ("b.mp4", Orientation::Landscape, 1.0),
                ("c.mp4", Orientation::Portrait, 3.0),
            ],
            JobMode::Debug,
        );

        let delivery = runner.run(&job).await.unwrap();

        let Delivery::Local(path) = delivery else {
            panic!("debug run should stay local");
        };
        assert!(path.starts_with(dir.path().join("out")));
        assert!(path.exists());
        assert!(store.get("media/out/final.mp4").is_none());
        // Segments survive for inspection.
        let workspace = dir.path().join("work").join(job.id.as_str());
        assert!(workspace.join("segment_1.mp4").exists());
    }

    #[tokio::test]
    async fn test_invalid_sequential_timing_rejected_before_fetch() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store();
        let engine = Arc::new(FakeEngine::with_duration(30.0));
        let runner = JobRunner::new(config(dir.path(), JobMode::Production), store.clone(), engine.clone());
        let mut job = job(
            &[
                ("a.mp4", Orientation::Portrait, 0.0),
                ("b.mp4", Orientation::Portrait, 1.0),
                ("c.mp4", Orientation::Portrait, 2.0),
            ],
            JobMode::Production,
        );
        job.segment_seconds = Some(0.5);

        let err = runner.run(&job).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(store.downloads(), 0);
        assert!(engine.rendered().is_empty());
    }

    #[tokio::test]
    async fn test_missing_input_is_acquisition_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.insert("media/a.mp4", b"A");
        let engine = Arc::new(FakeEngine::with_duration(30.0));
        let runner = JobRunner::new(config(dir.path(), JobMode::Production), store, engine.clone());
        let job = job(
            &[("a.mp4", Orientation::Portrait, 0.0), ("missing.mp4", Orientation::Portrait, 1.0)],
            JobMode::Production,
        );

        let err = runner.run(&job).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("media/missing.mp4"));
        assert!(engine.rendered().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_is_render_failure() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::with_duration(30.0).failing_on("compose"));
        let runner = JobRunner::new(config(dir.path(), JobMode::Production), seeded_store(), engine);
        let job = job(
            &[("a.mp4", Orientation::Portrait, 0.0), ("b.mp4", Orientation::Portrait, 2.0)],
            JobMode::Production,
        );

        let err = runner.run(&job).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_integrity_failure() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::with_duration(30.0).without_output());
        let runner = JobRunner::new(config(dir.path(), JobMode::Production), seeded_store(), engine);
        let job = job(
            &[("a.mp4", Orientation::Portrait, 0.0), ("b.mp4", Orientation::Portrait, 2.0)],
            JobMode::Production,
        );

        let err = runner.run(&job).await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_job_id_cannot_escape_work_dir() {
        let dir = TempDir::new().unwrap();
        let victim = dir.path().join("victim");
        std::fs::create_dir_all(&victim).unwrap();
        std::fs::write(victim.join("precious.txt"), b"keep").unwrap();

        let store = seeded_store();
        let engine = Arc::new(FakeEngine::with_duration(30.0));
        let runner = JobRunner::new(config(dir.path(), JobMode::Production), store.clone(), engine.clone());
        let mut job = job(
            &[("a.mp4", Orientation::Portrait, 0.0), ("b.mp4", Orientation::Portrait, 2.0)],
            JobMode::Production,
        );
        job.id = JobId::from_string("../victim");

        let err = runner.run(&job).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(victim.join("precious.txt").exists());
        assert_eq!(store.downloads(), 0);
        assert!(engine.rendered().is_empty());
    }

    #[tokio::test]
    async fn test_artifact_never_collides_with_intermediates() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::with_duration(30.0));
        let runner = JobRunner::new(config(dir.path(), JobMode::Debug), seeded_store(), engine);
        let clips = [
            ("a.mp4", Orientation::Portrait, 0.0),
            ("b.mp4", Orientation::Portrait, 1.0),
            ("c.mp4", Orientation::Portrait, 3.0),
        ]
        .iter()
        .map(|(p, o, off)| ClipRef::new(RemoteKey::new("media", *p).unwrap(), *o, *off).unwrap())
        .collect();
        let output = RemoteKey::new("media", "renders/segment_1.mp4").unwrap();
        let job = JobDescriptor::new(clips, output, JobMode::Debug).unwrap();

        runner.run(&job).await.unwrap();

        let workspace = dir.path().join("work").join(job.id.as_str());
        assert_eq!(std::fs::read(workspace.join("segment_1.mp4")).unwrap(), b"segment-1");
        assert_eq!(std::fs::read(workspace.join("final").join("segment_1.mp4")).unwrap(), b"compose");
    }

    #[tokio::test]
    async fn test_verify_artifact_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(verify_artifact(&path).await, Err(WorkerError::Integrity(_))));
    }
}
