//! Timing, layout and rendering for synchronized multi-camera compositions.
//!
//! This crate provides:
//! - Offset arithmetic (seeks, overlap, crossfade points, audio delays)
//! - Layout resolution from clip orientations
//! - A declarative render graph rendered to FFmpeg `-filter_complex`
//! - Per-layout composition plans and a pass-by-pass executor
//! - FFmpeg/FFprobe process wrappers with progress parsing and timeouts

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod graph;
pub mod layout;
pub mod logo;
pub mod pass;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod timing;

pub use command::{check_ffmpeg, check_ffprobe, CommandInput, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use graph::{RenderGraph, RenderStage, StageOp, StreamKind, StreamRef};
pub use layout::{resolve_layout, Layout, MixedAssignment};
pub use logo::{LogoConfig, DEFAULT_LOGO_PATH};
pub use pass::{PassInput, RenderPass};
pub use pipeline::{
    CompositionOutput, CompositionPipeline, CompositionRequest, FfmpegEngine, RenderEngine,
};
pub use plan::{CompositionConfig, CompositionPlan, PlanTiming, SequentialAudio, SourceClip};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use timing::{audio_alignment, overlap_duration, sync_seeks, two_clip_trims, SequentialTiming};
