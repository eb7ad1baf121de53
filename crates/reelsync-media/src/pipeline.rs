//! Composition pipeline executor.
//!
//! Turns a resolved layout and local clips into a [`CompositionPlan`] and runs
//! its passes one after another through a [`RenderEngine`]. Each pass is a
//! single blocking engine invocation; a failing pass aborts the composition
//! with no partial artifact. Outputs of earlier passes are left on disk for
//! the caller to keep or discard.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, partial_path};
use crate::layout::Layout;
use crate::pass::RenderPass;
use crate::plan::{CompositionConfig, CompositionPlan, SourceClip};
use crate::probe::probe_video;
use crate::progress::ProgressThrottle;

/// Rendering backend.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Run one pass to completion, leaving its output at `pass.output`.
    async fn render(&self, pass: &RenderPass) -> MediaResult<()>;
}

#[async_trait]
impl<T: RenderEngine + ?Sized> RenderEngine for Arc<T> {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        (**self).probe_duration(path).await
    }

    async fn render(&self, pass: &RenderPass) -> MediaResult<()> {
        (**self).render(pass).await
    }
}

/// FFmpeg/FFprobe backed engine.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    timeout_secs: Option<u64>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl RenderEngine for FfmpegEngine {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        Ok(probe_video(path).await?.duration)
    }

    async fn render(&self, pass: &RenderPass) -> MediaResult<()> {
        // Write to a staging path so the output only appears once complete.
        let staging = partial_path(&pass.output);
        let cmd = pass.to_command(&staging)?;

        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        let name = pass.name.clone();
        let expected = pass.duration.unwrap_or(0.0);
        let throttle = std::sync::Mutex::new(ProgressThrottle::new(10.0));
        let started = Instant::now();

        let result = runner
            .run_with_progress(&cmd, move |progress| {
                let pct = progress.percentage(expected);
                let emit = throttle.lock().map(|mut t| t.should_emit(pct)).unwrap_or(false);
                if emit {
                    debug!(
                        pass = %name,
                        percent = pct.round() as u64,
                        speed = progress.speed,
                        "render progress"
                    );
                }
            })
            .await;

        metrics::histogram!("reelsync_render_pass_duration_seconds", "pass" => pass.name.clone())
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }

        if !tokio::fs::try_exists(&staging).await? {
            return Err(MediaError::ffmpeg_failed(
                format!("pass {} exited cleanly but wrote no output", pass.name),
                None,
                Some(0),
            ));
        }
        move_file(&staging, &pass.output).await
    }
}

/// What to compose.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub layout: Layout,
    /// Local clips in job order
    pub clips: Vec<SourceClip>,
    /// Directory for intermediates
    pub workdir: PathBuf,
    /// Final artifact path
    pub output: PathBuf,
    /// Per-job sequential segment duration
    pub segment_seconds: Option<f64>,
}

/// Result of a successful composition.
#[derive(Debug, Clone)]
pub struct CompositionOutput {
    pub layout: Layout,
    pub artifact: PathBuf,
    pub intermediates: Vec<PathBuf>,
    pub passes: usize,
}

/// Plans and runs compositions.
pub struct CompositionPipeline<E> {
    engine: E,
    config: CompositionConfig,
}

impl<E: RenderEngine> CompositionPipeline<E> {
    pub fn new(engine: E, config: CompositionConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Build the plan for a request, probing sources where the layout needs it.
    pub async fn prepare(&self, request: &CompositionRequest) -> MediaResult<CompositionPlan> {
        if request.layout.is_sequential() {
            return CompositionPlan::sequential(
                &request.clips,
                &self.config,
                request.segment_seconds,
                &request.workdir,
                &request.output,
            );
        }

        let mut durations = Vec::with_capacity(request.clips.len());
        for clip in &request.clips {
            durations.push(self.engine.probe_duration(&clip.path).await?);
        }
        debug!(?durations, "probed source durations");

        CompositionPlan::simultaneous(
            request.layout,
            &request.clips,
            &durations,
            &self.config,
            &request.output,
        )
    }

    /// Plan and render. Passes run strictly in order.
    #[instrument(skip_all, fields(layout = %request.layout))]
    pub async fn execute(&self, request: &CompositionRequest) -> MediaResult<CompositionOutput> {
        tokio::fs::create_dir_all(&request.workdir).await?;
        let plan = self.prepare(request).await?;
        let total = plan.passes.len();

        for (i, pass) in plan.passes.iter().enumerate() {
            info!(
                pass = %pass.name,
                step = i + 1,
                total,
                output = %pass.output.display(),
                "starting render pass"
            );
            let started = Instant::now();
            self.engine.render(pass).await?;
            info!(
                pass = %pass.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "render pass finished"
            );
        }

        let artifact = plan
            .artifact()
            .map(Path::to_path_buf)
            .ok_or_else(|| MediaError::internal("plan has no passes"))?;

        Ok(CompositionOutput {
            layout: plan.layout,
            artifact,
            intermediates: plan.intermediates().into_iter().map(Path::to_path_buf).collect(),
            passes: total,
        })
    }
}
