//! Composition plans: the render passes for each layout.

use reelsync_models::{EncodingConfig, Orientation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{MediaError, MediaResult};
use crate::graph::{
    MixDuration, PadAnchor, RenderGraph, ScaleFit, StackAxis, StageOp, StreamKind, StreamRef,
};
use crate::layout::{Layout, MixedAssignment};
use crate::logo::{resolve_logo, LogoConfig};
use crate::pass::{PassInput, RenderPass};
use crate::timing::{audio_alignment, overlap_duration, sync_seeks, AudioAlignment, SequentialTiming};

/// Canvas padding color.
pub const DEFAULT_PAD_COLOR: &str = "0x5762FF";
/// Fraction of the frame kept by the center crops.
pub const DEFAULT_CROP_FACTOR: f64 = 0.8;
/// Sequential segment duration `S` in seconds.
pub const DEFAULT_SEGMENT_SECONDS: f64 = 10.0;
/// Sequential crossfade duration `F` in seconds.
pub const DEFAULT_FADE_SECONDS: f64 = 1.0;

/// Audio construction for the sequential layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SequentialAudio {
    /// Each segment's own audio, joined with crossfades.
    #[default]
    Crossfade,
    /// All full tracks delayed onto the reference timeline and mixed, in its
    /// own intermediate pass.
    DelayMix,
}

impl SequentialAudio {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequentialAudio::Crossfade => "crossfade",
            SequentialAudio::DelayMix => "delay-mix",
        }
    }
}

impl FromStr for SequentialAudio {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crossfade" => Ok(SequentialAudio::Crossfade),
            "delay-mix" | "delay_mix" | "delaymix" => Ok(SequentialAudio::DelayMix),
            other => Err(MediaError::validation(format!(
                "unknown sequential audio strategy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SequentialAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs shared by every composition.
#[derive(Debug, Clone)]
pub struct CompositionConfig {
    pub crop_factor: f64,
    pub pad_color: String,
    /// Logo image; compositions render without a logo when unset or missing.
    pub logo_path: Option<PathBuf>,
    pub segment_seconds: f64,
    pub fade_seconds: f64,
    pub sequential_audio: SequentialAudio,
    pub encoding: EncodingConfig,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            crop_factor: DEFAULT_CROP_FACTOR,
            pad_color: DEFAULT_PAD_COLOR.to_string(),
            logo_path: None,
            segment_seconds: DEFAULT_SEGMENT_SECONDS,
            fade_seconds: DEFAULT_FADE_SECONDS,
            sequential_audio: SequentialAudio::default(),
            encoding: EncodingConfig::default(),
        }
    }
}

impl CompositionConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if !(self.crop_factor > 0.0 && self.crop_factor <= 1.0) {
            return Err(MediaError::validation(format!(
                "crop factor must be in (0, 1], got {}",
                self.crop_factor
            )));
        }
        Ok(())
    }
}

/// A source clip already available on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceClip {
    pub path: PathBuf,
    pub orientation: Orientation,
    pub offset: f64,
}

/// Timing chosen for a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanTiming {
    /// Every clip plays at once; `duration` is the overlap window.
    Simultaneous { seeks: Vec<f64>, duration: f64 },
    Sequential(SequentialTiming),
}

/// Ordered render passes producing one artifact.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    pub layout: Layout,
    pub timing: PlanTiming,
    pub passes: Vec<RenderPass>,
}

impl CompositionPlan {
    /// Output of the last pass.
    pub fn artifact(&self) -> Option<&Path> {
        self.passes.last().map(|p| p.output.as_path())
    }

    /// Outputs of every pass but the last.
    pub fn intermediates(&self) -> Vec<&Path> {
        let n = self.passes.len().saturating_sub(1);
        self.passes[..n].iter().map(|p| p.output.as_path()).collect()
    }

    /// Plan for a layout where every clip plays simultaneously.
    ///
    /// `durations` are the probed source durations, in clip order.
    pub fn simultaneous(
        layout: Layout,
        clips: &[SourceClip],
        durations: &[f64],
        config: &CompositionConfig,
        output: &Path,
    ) -> MediaResult<Self> {
        check_layout(&layout, clips)?;
        config.validate()?;

        let offsets: Vec<f64> = clips.iter().map(|c| c.offset).collect();
        let seeks = sync_seeks(&offsets)?;
        let duration = overlap_duration(durations, &seeks)?;

        let logo = resolve_logo(&layout, config.logo_path.as_deref());
        let mut graph = RenderGraph::new(clips.len() + usize::from(logo.is_some()));

        let base = match layout {
            Layout::DualPortrait => dual_portrait_video(&mut graph, config),
            Layout::DualLandscape => dual_landscape_video(&mut graph, config),
            Layout::Mixed(assignment) => mixed_video(&mut graph, assignment, config),
            Layout::SequentialThree => {
                return Err(MediaError::internal("sequential layout is not simultaneous"));
            }
        };
        let video = finish_video(&mut graph, base, logo.as_ref(), clips.len());
        let audio = match layout {
            Layout::DualLandscape => merged_mono_audio(&mut graph, clips.len()),
            _ => resampled_mix_audio(&mut graph, clips.len()),
        };
        graph.mux(Some(video), Some(audio));

        let mut inputs: Vec<PassInput> = clips
            .iter()
            .zip(&seeks)
            .map(|(clip, seek)| PassInput::new(&clip.path).with_seek(*seek))
            .collect();
        if let Some(logo) = &logo {
            inputs.push(PassInput::new(&logo.image_path));
        }

        let pass = RenderPass {
            name: "compose".to_string(),
            inputs,
            graph,
            encoding: config.encoding.clone(),
            duration: Some(duration),
            output: output.to_path_buf(),
        };

        Ok(Self {
            layout,
            timing: PlanTiming::Simultaneous { seeks, duration },
            passes: vec![pass],
        })
    }

    /// Plan for the three-clip sequential layout.
    ///
    /// Pass 1 renders three constant-length segments into `workdir`; with
    /// [`SequentialAudio::DelayMix`] an audio pass follows; the final pass
    /// joins everything into `output`.
    pub fn sequential(
        clips: &[SourceClip],
        config: &CompositionConfig,
        segment_override: Option<f64>,
        workdir: &Path,
        output: &Path,
    ) -> MediaResult<Self> {
        let layout = Layout::SequentialThree;
        check_layout(&layout, clips)?;
        config.validate()?;

        let offsets: Vec<f64> = clips.iter().map(|c| c.offset).collect();
        let segment = segment_override.unwrap_or(config.segment_seconds);
        let timing = SequentialTiming::compute(&offsets, segment, config.fade_seconds)?;

        let mut passes = Vec::with_capacity(5);
        let mut segment_paths = Vec::with_capacity(3);
        for (i, clip) in clips.iter().enumerate() {
            let path = workdir.join(format!("segment_{}.mp4", i + 1));
            passes.push(segment_pass(i, clip, &timing, config, &path));
            segment_paths.push(path);
        }

        let mixed_audio = match config.sequential_audio {
            SequentialAudio::DelayMix => {
                let path = workdir.join("audio_mix.m4a");
                passes.push(delay_mix_pass(clips, &timing, config, &path));
                Some(path)
            }
            SequentialAudio::Crossfade => None,
        };

        let logo = resolve_logo(&layout, config.logo_path.as_deref());
        let mut inputs: Vec<PassInput> = segment_paths.iter().map(PassInput::new).collect();
        if let Some(path) = &mixed_audio {
            inputs.push(PassInput::new(path));
        }
        let logo_input = inputs.len();
        if let Some(logo) = &logo {
            inputs.push(PassInput::new(&logo.image_path));
        }

        let mut graph = RenderGraph::new(inputs.len());
        let fade = timing.fade;
        let x1 = graph.stage(
            StageOp::Crossfade {
                kind: StreamKind::Video,
                duration: fade,
                offset: timing.crossfades[0],
            },
            vec![StreamRef::video(0), StreamRef::video(1)],
            "x1",
        );
        let x2 = graph.stage(
            StageOp::Crossfade {
                kind: StreamKind::Video,
                duration: fade,
                offset: timing.crossfades[1],
            },
            vec![x1, StreamRef::video(2)],
            "x2",
        );
        let video = finish_video(&mut graph, x2, logo.as_ref(), logo_input);

        let audio = match mixed_audio {
            Some(_) => StreamRef::audio(3),
            None => {
                let first = graph.stage(
                    StageOp::Trim {
                        kind: StreamKind::Audio,
                        start: 0.0,
                        duration: Some(timing.segment),
                    },
                    vec![StreamRef::audio(0)],
                    "a1",
                );
                let joined = graph.stage(
                    StageOp::Crossfade {
                        kind: StreamKind::Audio,
                        duration: fade,
                        offset: timing.crossfades[0],
                    },
                    vec![first, StreamRef::audio(1)],
                    "a12",
                );
                graph.stage(
                    StageOp::Crossfade {
                        kind: StreamKind::Audio,
                        duration: fade,
                        offset: timing.crossfades[1],
                    },
                    vec![joined, StreamRef::audio(2)],
                    "aout",
                )
            }
        };
        graph.mux(Some(video), Some(audio));

        passes.push(RenderPass {
            name: "compose".to_string(),
            inputs,
            graph,
            encoding: config.encoding.clone(),
            duration: Some(timing.total),
            output: output.to_path_buf(),
        });

        Ok(Self {
            layout,
            timing: PlanTiming::Sequential(timing),
            passes,
        })
    }
}

fn check_layout(layout: &Layout, clips: &[SourceClip]) -> MediaResult<()> {
    if clips.len() != layout.clip_count() {
        return Err(MediaError::validation(format!(
            "{layout} layout needs {} clips, got {}",
            layout.clip_count(),
            clips.len()
        )));
    }
    let expected = match layout {
        Layout::DualPortrait => Some(Orientation::Portrait),
        Layout::DualLandscape => Some(Orientation::Landscape),
        Layout::Mixed(assignment) => {
            let actual =
                MixedAssignment::from_orientations(clips[0].orientation, clips[1].orientation)?;
            if actual != *assignment {
                return Err(MediaError::validation(
                    "mixed zone assignment does not match clip orientations",
                ));
            }
            None
        }
        Layout::SequentialThree => None,
    };
    if let Some(o) = expected {
        if clips.iter().any(|c| c.orientation != o) {
            return Err(MediaError::validation(format!(
                "{layout} layout requires every clip to be {o}"
            )));
        }
    }
    Ok(())
}

fn normalize_video() -> StageOp {
    StageOp::Normalize {
        kind: StreamKind::Video,
        fps: None,
    }
}

fn crop_height(factor: f64) -> StageOp {
    StageOp::Crop {
        width: "iw".to_string(),
        height: format!("trunc(ih*{factor:.3}/2)*2"),
    }
}

fn crop_width(factor: f64) -> StageOp {
    StageOp::Crop {
        width: format!("trunc(iw*{factor:.3}/2)*2"),
        height: "ih".to_string(),
    }
}

fn fit_box(width: u32, height: u32) -> StageOp {
    StageOp::Scale {
        width: width.to_string(),
        height: height.to_string(),
        fit: ScaleFit::Decrease,
    }
}

fn pad(width: u32, height: u32, config: &CompositionConfig) -> StageOp {
    StageOp::Pad {
        width,
        height,
        color: config.pad_color.clone(),
        anchor: PadAnchor::Center,
    }
}

/// Side by side on a 1920x1080 canvas.
fn dual_portrait_video(graph: &mut RenderGraph, config: &CompositionConfig) -> StreamRef {
    let panels: Vec<StreamRef> = (0..2)
        .map(|i| {
            graph.chain(
                StreamRef::video(i),
                vec![
                    normalize_video(),
                    StageOp::Scale {
                        width: "-2".to_string(),
                        height: "1080".to_string(),
                        fit: ScaleFit::Exact,
                    },
                    crop_height(config.crop_factor),
                ],
                &format!("p{i}"),
            )
        })
        .collect();
    let stacked = graph.stage(
        StageOp::Stack {
            axis: StackAxis::Horizontal,
        },
        panels,
        "stacked",
    );
    graph.chain(stacked, vec![fit_box(1920, 1080), pad(1920, 1080, config)], "bg")
}

/// Two 1080x960 panels stacked into 1080x1920.
fn dual_landscape_video(graph: &mut RenderGraph, config: &CompositionConfig) -> StreamRef {
    let panels: Vec<StreamRef> = (0..2)
        .map(|i| {
            graph.chain(
                StreamRef::video(i),
                vec![
                    normalize_video(),
                    crop_width(config.crop_factor),
                    fit_box(1080, 960),
                    pad(1080, 960, config),
                ],
                &format!("l{i}"),
            )
        })
        .collect();
    graph.stage(
        StageOp::Stack {
            axis: StackAxis::Vertical,
        },
        panels,
        "bg",
    )
}

/// Portrait in the top 1080x1280 zone, landscape in the bottom 1080x640 zone.
fn mixed_video(
    graph: &mut RenderGraph,
    assignment: MixedAssignment,
    config: &CompositionConfig,
) -> StreamRef {
    let top = graph.chain(
        StreamRef::video(assignment.portrait),
        vec![
            normalize_video(),
            crop_height(config.crop_factor),
            fit_box(1080, 1280),
            pad(1080, 1280, config),
        ],
        "top",
    );
    let bottom = graph.chain(
        StreamRef::video(assignment.landscape),
        vec![
            normalize_video(),
            crop_width(config.crop_factor),
            fit_box(1080, 640),
            pad(1080, 640, config),
        ],
        "bottom",
    );
    graph.stage(
        StageOp::Stack {
            axis: StackAxis::Vertical,
        },
        vec![top, bottom],
        "bg",
    )
}

fn finish_video(
    graph: &mut RenderGraph,
    base: StreamRef,
    logo: Option<&LogoConfig>,
    logo_input: usize,
) -> StreamRef {
    match logo {
        Some(logo) => logo.attach(graph, base, logo_input, "outv"),
        None => graph.stage(
            StageOp::Format {
                pix_fmt: "yuv420p".to_string(),
            },
            vec![base],
            "outv",
        ),
    }
}

fn resampled_mix_audio(graph: &mut RenderGraph, n: usize) -> StreamRef {
    let tracks: Vec<StreamRef> = (0..n)
        .map(|i| graph.stage(StageOp::Resample, vec![StreamRef::audio(i)], &format!("a{i}")))
        .collect();
    graph.stage(
        StageOp::Mix {
            normalize: false,
            duration: MixDuration::Longest,
        },
        tracks,
        "aout",
    )
}

/// Merge the tracks, fold to mono with equal weights, duplicate to stereo.
fn merged_mono_audio(graph: &mut RenderGraph, n: usize) -> StreamRef {
    let tracks: Vec<StreamRef> = (0..n)
        .map(|i| {
            graph.chain(
                StreamRef::audio(i),
                vec![
                    StageOp::Normalize {
                        kind: StreamKind::Audio,
                        fps: None,
                    },
                    StageOp::Pan {
                        layout: "mono|c0=c0".to_string(),
                    },
                ],
                &format!("m{i}"),
            )
        })
        .collect();
    let merged = graph.stage(StageOp::Merge, tracks, "merged");
    let weight = 1.0 / n as f64;
    let mono = (0..n)
        .map(|i| format!("{weight:.3}*c{i}"))
        .collect::<Vec<_>>()
        .join("+");
    graph.chain(
        merged,
        vec![
            StageOp::Pan {
                layout: format!("mono|c0={mono}"),
            },
            StageOp::Pan {
                layout: "stereo|c0=c0|c1=c0".to_string(),
            },
        ],
        "aout",
    )
}

fn segment_pass(
    index: usize,
    clip: &SourceClip,
    timing: &SequentialTiming,
    config: &CompositionConfig,
    output: &Path,
) -> RenderPass {
    let mut graph = RenderGraph::new(1);
    let video = graph.chain(
        StreamRef::video(0),
        vec![
            StageOp::Normalize {
                kind: StreamKind::Video,
                fps: Some(config.encoding.frame_rate),
            },
            fit_box(1080, 1920),
            pad(1080, 1920, config),
            StageOp::Format {
                pix_fmt: "yuv420p".to_string(),
            },
        ],
        "outv",
    );
    let audio = graph.stage(StageOp::Resample, vec![StreamRef::audio(0)], "aout");
    graph.mux(Some(video), Some(audio));

    RenderPass {
        name: format!("segment-{}", index + 1),
        inputs: vec![PassInput::new(&clip.path)
            .with_seek(timing.seeks[index])
            .with_duration(timing.segment_render)],
        graph,
        encoding: config.encoding.for_intermediate(),
        duration: Some(timing.segment_render),
        output: output.to_path_buf(),
    }
}

/// Full tracks placed on the reference timeline, mixed and cut to the total.
fn delay_mix_pass(
    clips: &[SourceClip],
    timing: &SequentialTiming,
    config: &CompositionConfig,
    output: &Path,
) -> RenderPass {
    let mut graph = RenderGraph::new(clips.len());
    let tracks: Vec<StreamRef> = clips
        .iter()
        .enumerate()
        .map(|(i, clip)| {
            let align = match audio_alignment(clip.offset) {
                AudioAlignment::Delay { millis } => StageOp::Delay { millis },
                AudioAlignment::LeadTrim { seconds } => StageOp::Trim {
                    kind: StreamKind::Audio,
                    start: seconds,
                    duration: None,
                },
            };
            graph.chain(
                StreamRef::audio(i),
                vec![StageOp::Resample, align],
                &format!("t{i}"),
            )
        })
        .collect();
    let mixed = graph.stage(
        StageOp::Mix {
            normalize: false,
            duration: MixDuration::Longest,
        },
        tracks,
        "mixed",
    );
    let audio = graph.chain(
        mixed,
        vec![
            StageOp::Trim {
                kind: StreamKind::Audio,
                start: 0.0,
                duration: Some(timing.total),
            },
            StageOp::FadeOut {
                start: timing.total - timing.fade,
                duration: timing.fade,
            },
        ],
        "aout",
    );
    graph.mux(None, Some(audio));

    RenderPass {
        name: "audio-mix".to_string(),
        inputs: clips.iter().map(|c| PassInput::new(&c.path)).collect(),
        graph,
        encoding: config.encoding.clone(),
        duration: Some(timing.total),
        output: output.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Orientation::{Landscape, Portrait};

    fn clip(name: &str, orientation: Orientation, offset: f64) -> SourceClip {
        SourceClip {
            path: PathBuf::from(format!("/work/{name}")),
            orientation,
            offset,
        }
    }

    fn filter_of(pass: &RenderPass) -> String {
        pass.graph.validate().unwrap();
        pass.graph.to_filter_complex().unwrap()
    }

    #[test]
    fn test_dual_portrait_plan() {
        let clips = [clip("a.mp4", Portrait, 0.0), clip("b.mp4", Portrait, 0.116)];
        let plan = CompositionPlan::simultaneous(
            Layout::DualPortrait,
            &clips,
            &[60.0, 58.0],
            &CompositionConfig::default(),
            Path::new("/work/out.mp4"),
        )
        .unwrap();

        let PlanTiming::Simultaneous { seeks, duration } = &plan.timing else {
            panic!("expected simultaneous timing");
        };
        assert!((seeks[0] - 0.116).abs() < 1e-9);
        assert_eq!(seeks[1], 0.0);
        assert!((duration - 58.0).abs() < 1e-9);

        assert_eq!(plan.passes.len(), 1);
        let pass = &plan.passes[0];
        assert!((pass.inputs[0].seek - 0.116).abs() < 1e-9);
        assert_eq!(pass.inputs[1].seek, 0.0);

        let filter = filter_of(pass);
        assert!(filter.contains("[0:v]setpts=PTS-STARTPTS[p0_0]"));
        assert!(filter.contains("[p0_0]scale=-2:1080[p0_1]"));
        assert!(filter.contains("[p0_1]crop=iw:trunc(ih*0.800/2)*2[p0]"));
        assert!(filter.contains("[p0][p1]hstack=inputs=2[stacked]"));
        assert!(filter.contains("pad=1920:1080:(ow-iw)/2:(oh-ih)/2:0x5762FF[bg]"));
        assert!(filter.contains("[0:a]aresample=async=1:first_pts=0[a0]"));
        assert!(filter.contains("[a0][a1]amix=inputs=2:duration=longest:normalize=0[aout]"));
        assert!(filter.contains("[bg]format=yuv420p[outv]"));
        assert!(plan.intermediates().is_empty());
        assert_eq!(plan.artifact(), Some(Path::new("/work/out.mp4")));
    }

    #[test]
    fn test_dual_landscape_audio_and_geometry() {
        let clips = [clip("a.mp4", Landscape, 0.0), clip("b.mp4", Landscape, -1.0)];
        let plan = CompositionPlan::simultaneous(
            Layout::DualLandscape,
            &clips,
            &[30.0, 30.0],
            &CompositionConfig::default(),
            Path::new("/work/out.mp4"),
        )
        .unwrap();
        let pass = &plan.passes[0];
        assert_eq!(pass.inputs[0].seek, 0.0);
        assert_eq!(pass.inputs[1].seek, 1.0);
        assert_eq!(pass.duration, Some(29.0));

        let filter = filter_of(pass);
        assert!(filter.contains("crop=trunc(iw*0.800/2)*2:ih"));
        assert!(filter.contains("scale=1080:960:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("[l0][l1]vstack=inputs=2[bg]"));
        assert!(filter.contains("[m0][m1]amerge=inputs=2[merged]"));
        assert!(filter.contains("pan=mono|c0=0.500*c0+0.500*c1"));
        assert!(filter.contains("pan=stereo|c0=c0|c1=c0[aout]"));
    }

    #[test]
    fn test_mixed_geometry_independent_of_order() {
        let config = CompositionConfig::default();
        let out = Path::new("/work/out.mp4");

        let pl = [clip("p.mp4", Portrait, 0.0), clip("l.mp4", Landscape, 0.5)];
        let lp = [clip("l.mp4", Landscape, 0.0), clip("p.mp4", Portrait, 0.5)];

        let plan_pl = CompositionPlan::simultaneous(
            Layout::Mixed(MixedAssignment::from_orientations(Portrait, Landscape).unwrap()),
            &pl,
            &[20.0, 20.0],
            &config,
            out,
        )
        .unwrap();
        let plan_lp = CompositionPlan::simultaneous(
            Layout::Mixed(MixedAssignment::from_orientations(Landscape, Portrait).unwrap()),
            &lp,
            &[20.0, 20.0],
            &config,
            out,
        )
        .unwrap();

        let f_pl = filter_of(&plan_pl.passes[0]);
        let f_lp = filter_of(&plan_lp.passes[0]);
        assert!(f_pl.starts_with("[0:v]setpts=PTS-STARTPTS[top_0]"));
        assert!(f_lp.starts_with("[1:v]setpts=PTS-STARTPTS[top_0]"));
        // Same graph once the input indexes are swapped.
        let swapped = f_lp
            .replace("[0:", "[X:")
            .replace("[1:", "[0:")
            .replace("[X:", "[1:");
        let video_part = |f: &str| f.split("[outv]").next().unwrap_or_default().to_string();
        assert_eq!(video_part(&swapped), video_part(&f_pl));
        assert!(f_pl.contains("pad=1080:1280:(ow-iw)/2:(oh-ih)/2:0x5762FF[top]"));
        assert!(f_pl.contains("pad=1080:640:(ow-iw)/2:(oh-ih)/2:0x5762FF[bottom]"));
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let clips = [clip("a.mp4", Portrait, 0.0), clip("b.mp4", Landscape, 0.0)];
        let err = CompositionPlan::simultaneous(
            Layout::DualPortrait,
            &clips,
            &[10.0, 10.0],
            &CompositionConfig::default(),
            Path::new("/o.mp4"),
        )
        .unwrap_err();
        assert!(err.is_validation());

        let err = CompositionPlan::simultaneous(
            Layout::Mixed(MixedAssignment {
                portrait: 1,
                landscape: 0,
            }),
            &clips,
            &[10.0, 10.0],
            &CompositionConfig::default(),
            Path::new("/o.mp4"),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_logo_attached_when_available() {
        let dir = tempfile::TempDir::new().unwrap();
        let logo = dir.path().join("logo.png");
        std::fs::write(&logo, b"png").unwrap();
        let config = CompositionConfig {
            logo_path: Some(logo.clone()),
            ..Default::default()
        };
        let clips = [clip("a.mp4", Portrait, 0.0), clip("b.mp4", Portrait, 1.0)];
        let plan = CompositionPlan::simultaneous(
            Layout::DualPortrait,
            &clips,
            &[10.0, 10.0],
            &config,
            Path::new("/o.mp4"),
        )
        .unwrap();
        let pass = &plan.passes[0];
        assert_eq!(pass.inputs.len(), 3);
        assert_eq!(pass.inputs[2].path, logo);
        let filter = filter_of(pass);
        assert!(filter.contains("[2:v]scale=345:-1[logo_0]"));
        assert!(filter.contains("[bg][logo]overlay=W-w-48:H-h-48:format=auto[outv]"));
    }

    #[test]
    fn test_sequential_crossfade_plan() {
        let clips = [
            clip("a.mp4", Portrait, 0.0),
            clip("b.mp4", Landscape, 5.2),
            clip("c.mp4", Portrait, 8.7),
        ];
        let plan = CompositionPlan::sequential(
            &clips,
            &CompositionConfig::default(),
            None,
            Path::new("/work"),
            Path::new("/work/final.mp4"),
        )
        .unwrap();

        assert_eq!(plan.passes.len(), 4);
        let seeks: Vec<f64> = plan.passes[..3].iter().map(|p| p.inputs[0].seek).collect();
        assert!((seeks[1] - 4.8).abs() < 1e-9);
        assert!((seeks[2] - 11.3).abs() < 1e-9);
        for pass in &plan.passes[..3] {
            assert_eq!(pass.inputs[0].duration, Some(11.0));
            assert_eq!(pass.duration, Some(11.0));
            assert!(filter_of(pass).contains("setpts=PTS-STARTPTS,fps=30"));
        }
        assert_eq!(
            plan.intermediates(),
            vec![
                Path::new("/work/segment_1.mp4"),
                Path::new("/work/segment_2.mp4"),
                Path::new("/work/segment_3.mp4"),
            ]
        );

        let compose = &plan.passes[3];
        assert_eq!(compose.duration, Some(30.0));
        let filter = filter_of(compose);
        assert!(filter.contains("[0:v][1:v]xfade=transition=fade:duration=1.000:offset=9.000[x1]"));
        assert!(filter.contains("[x1][2:v]xfade=transition=fade:duration=1.000:offset=19.000[x2]"));
        assert!(filter.contains("[0:a]atrim=start=0.000:duration=10.000,asetpts=PTS-STARTPTS[a1]"));
        assert!(filter.contains("[a1][1:a]acrossfade=d=1.000[a12]"));
        assert!(filter.contains("[a12][2:a]acrossfade=d=1.000[aout]"));
    }

    #[test]
    fn test_sequential_delay_mix_plan() {
        let clips = [
            clip("a.mp4", Portrait, 0.0),
            clip("b.mp4", Portrait, 5.2),
            clip("c.mp4", Portrait, -1.5),
        ];
        let config = CompositionConfig {
            sequential_audio: SequentialAudio::DelayMix,
            ..Default::default()
        };
        let plan = CompositionPlan::sequential(
            &clips,
            &config,
            Some(8.0),
            Path::new("/work"),
            Path::new("/work/final.mp4"),
        )
        .unwrap();

        assert_eq!(plan.passes.len(), 5);
        let audio = &plan.passes[3];
        assert_eq!(audio.output, PathBuf::from("/work/audio_mix.m4a"));
        assert_eq!(audio.graph.output_kinds(), (false, true));
        let filter = filter_of(audio);
        assert!(filter.contains("[t0_0]adelay=delays=0:all=1[t0]"));
        assert!(filter.contains("[t1_0]adelay=delays=5200:all=1[t1]"));
        assert!(filter.contains("[t2_0]atrim=start=1.500,asetpts=PTS-STARTPTS[t2]"));
        assert!(filter.contains("atrim=start=0.000:duration=24.000"));
        assert!(filter.contains("afade=t=out:st=23.000:d=1.000[aout]"));

        let compose = &plan.passes[4];
        compose.graph.validate().unwrap();
        assert_eq!(compose.inputs[3].path, PathBuf::from("/work/audio_mix.m4a"));
        assert!(compose.graph.map_args().ends_with(&["-map".to_string(), "3:a".to_string()]));
        assert_eq!(compose.duration, Some(24.0));
    }

    #[test]
    fn test_sequential_rejects_bad_fade() {
        let clips = [
            clip("a.mp4", Portrait, 0.0),
            clip("b.mp4", Portrait, 1.0),
            clip("c.mp4", Portrait, 2.0),
        ];
        let config = CompositionConfig {
            fade_seconds: 12.0,
            ..Default::default()
        };
        let err = CompositionPlan::sequential(&clips, &config, None, Path::new("/w"), Path::new("/w/o.mp4"))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_audio_strategy_parse() {
        assert_eq!("delay-mix".parse::<SequentialAudio>().unwrap(), SequentialAudio::DelayMix);
        assert_eq!("Crossfade".parse::<SequentialAudio>().unwrap(), SequentialAudio::Crossfade);
        assert!("louder".parse::<SequentialAudio>().is_err());
    }
}
