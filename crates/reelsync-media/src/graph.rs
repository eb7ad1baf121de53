//! Declarative render graph.
//!
//! A pass is described as an ordered list of [`RenderStage`]s. Every stage
//! consumes raw source streams (`[0:v]`, `[1:a]`) or the labelled outputs of
//! earlier stages and produces one labelled output, except the single
//! [`StageOp::Mux`] stage, which takes the terminal video and/or audio stream
//! and maps it into the output file.
//!
//! [`RenderGraph::validate`] enforces the structure FFmpeg expects: labels
//! are defined before use (so the graph is acyclic), every label is consumed
//! exactly once, stream kinds line up and there is exactly one mux stage
//! with at most one stream per kind.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{MediaError, MediaResult};

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn specifier(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

/// Reference to a stream consumed by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamRef {
    /// Stream of a pass input file.
    Source { input: usize, kind: StreamKind },
    /// Output of an earlier stage.
    Stage(String),
}

impl StreamRef {
    pub fn video(input: usize) -> Self {
        StreamRef::Source {
            input,
            kind: StreamKind::Video,
        }
    }

    pub fn audio(input: usize) -> Self {
        StreamRef::Source {
            input,
            kind: StreamKind::Audio,
        }
    }

    pub fn stage(label: impl Into<String>) -> Self {
        StreamRef::Stage(label.into())
    }

    /// Argument for `-map`.
    pub fn map_target(&self) -> String {
        match self {
            StreamRef::Source { input, kind } => format!("{input}:{}", kind.specifier()),
            StreamRef::Stage(label) => format!("[{label}]"),
        }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Source { input, kind } => write!(f, "[{input}:{}]", kind.specifier()),
            StreamRef::Stage(label) => write!(f, "[{label}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFit {
    Exact,
    /// Shrink to fit inside the box, keeping aspect ratio.
    Decrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAnchor {
    Center,
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    /// `lut=a='val*k'`
    Lut,
    /// `colorchannelmixer=aa=k`
    ChannelMixer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixDuration {
    Longest,
    Shortest,
    First,
}

impl MixDuration {
    fn as_str(&self) -> &'static str {
        match self {
            MixDuration::Longest => "longest",
            MixDuration::Shortest => "shortest",
            MixDuration::First => "first",
        }
    }
}

/// Operation performed by a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOp {
    /// Reset timestamps to start at zero; optionally force a constant rate.
    Normalize { kind: StreamKind, fps: Option<u32> },
    Scale {
        width: String,
        height: String,
        fit: ScaleFit,
    },
    /// Centered crop.
    Crop { width: String, height: String },
    Pad {
        width: u32,
        height: u32,
        color: String,
        anchor: PadAnchor,
    },
    Format { pix_fmt: String },
    /// Scale the alpha channel by `opacity`.
    Alpha { opacity: f64, mode: AlphaMode },
    Stack { axis: StackAxis },
    Overlay { x: String, y: String },
    /// Keep `[start, start + duration)` and reset timestamps.
    Trim {
        kind: StreamKind,
        start: f64,
        duration: Option<f64>,
    },
    Resample,
    Delay { millis: u64 },
    FadeOut { start: f64, duration: f64 },
    Mix {
        normalize: bool,
        duration: MixDuration,
    },
    Merge,
    Pan { layout: String },
    /// `xfade` for video (at `offset`), `acrossfade` for audio.
    Crossfade {
        kind: StreamKind,
        duration: f64,
        offset: f64,
    },
    Mux,
}

impl StageOp {
    /// Stream kind produced (and consumed) by this op. `None` for mux.
    pub fn kind(&self) -> Option<StreamKind> {
        match self {
            StageOp::Normalize { kind, .. }
            | StageOp::Trim { kind, .. }
            | StageOp::Crossfade { kind, .. } => Some(*kind),
            StageOp::Scale { .. }
            | StageOp::Crop { .. }
            | StageOp::Pad { .. }
            | StageOp::Format { .. }
            | StageOp::Alpha { .. }
            | StageOp::Stack { .. }
            | StageOp::Overlay { .. } => Some(StreamKind::Video),
            StageOp::Resample
            | StageOp::Delay { .. }
            | StageOp::FadeOut { .. }
            | StageOp::Mix { .. }
            | StageOp::Merge
            | StageOp::Pan { .. } => Some(StreamKind::Audio),
            StageOp::Mux => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageOp::Normalize { .. } => "normalize",
            StageOp::Scale { .. } => "scale",
            StageOp::Crop { .. } => "crop",
            StageOp::Pad { .. } => "pad",
            StageOp::Format { .. } => "format",
            StageOp::Alpha { .. } => "alpha",
            StageOp::Stack { .. } => "stack",
            StageOp::Overlay { .. } => "overlay",
            StageOp::Trim { .. } => "trim",
            StageOp::Resample => "resample",
            StageOp::Delay { .. } => "delay",
            StageOp::FadeOut { .. } => "fade",
            StageOp::Mix { .. } => "mix",
            StageOp::Merge => "merge",
            StageOp::Pan { .. } => "pan",
            StageOp::Crossfade { .. } => "crossfade",
            StageOp::Mux => "mux",
        }
    }

    fn arity_ok(&self, n: usize) -> bool {
        match self {
            StageOp::Stack { .. } | StageOp::Mix { .. } | StageOp::Merge => n >= 2,
            StageOp::Overlay { .. } | StageOp::Crossfade { .. } => n == 2,
            StageOp::Mux => (1..=2).contains(&n),
            _ => n == 1,
        }
    }

    /// FFmpeg filter text for `n` inputs.
    fn filter(&self, n: usize) -> String {
        match self {
            StageOp::Normalize { kind, fps } => match (kind, fps) {
                (StreamKind::Video, Some(fps)) => format!("setpts=PTS-STARTPTS,fps={fps}"),
                (StreamKind::Video, None) => "setpts=PTS-STARTPTS".to_string(),
                (StreamKind::Audio, _) => "asetpts=PTS-STARTPTS".to_string(),
            },
            StageOp::Scale { width, height, fit } => match fit {
                ScaleFit::Exact => format!("scale={width}:{height}"),
                ScaleFit::Decrease => {
                    format!("scale={width}:{height}:force_original_aspect_ratio=decrease")
                }
            },
            StageOp::Crop { width, height } => format!("crop={width}:{height}"),
            StageOp::Pad {
                width,
                height,
                color,
                anchor,
            } => match anchor {
                PadAnchor::Center => format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:{color}"),
                PadAnchor::Top => format!("pad={width}:{height}:(ow-iw)/2:0:{color}"),
            },
            StageOp::Format { pix_fmt } => format!("format={pix_fmt}"),
            StageOp::Alpha { opacity, mode } => match mode {
                AlphaMode::Lut => format!("lut=a='val*{opacity:.2}'"),
                AlphaMode::ChannelMixer => format!("colorchannelmixer=aa={opacity:.2}"),
            },
            StageOp::Stack { axis } => match axis {
                StackAxis::Horizontal => format!("hstack=inputs={n}"),
                StackAxis::Vertical => format!("vstack=inputs={n}"),
            },
            StageOp::Overlay { x, y } => format!("overlay={x}:{y}:format=auto"),
            StageOp::Trim {
                kind,
                start,
                duration,
            } => {
                let (trim, setpts) = match kind {
                    StreamKind::Video => ("trim", "setpts"),
                    StreamKind::Audio => ("atrim", "asetpts"),
                };
                match duration {
                    Some(d) => format!("{trim}=start={start:.3}:duration={d:.3},{setpts}=PTS-STARTPTS"),
                    None => format!("{trim}=start={start:.3},{setpts}=PTS-STARTPTS"),
                }
            }
            StageOp::Resample => "aresample=async=1:first_pts=0".to_string(),
            StageOp::Delay { millis } => format!("adelay=delays={millis}:all=1"),
            StageOp::FadeOut { start, duration } => {
                format!("afade=t=out:st={start:.3}:d={duration:.3}")
            }
            StageOp::Mix {
                normalize,
                duration,
            } => format!(
                "amix=inputs={n}:duration={}:normalize={}",
                duration.as_str(),
                u8::from(*normalize)
            ),
            StageOp::Merge => format!("amerge=inputs={n}"),
            StageOp::Pan { layout } => format!("pan={layout}"),
            StageOp::Crossfade {
                kind,
                duration,
                offset,
            } => match kind {
                StreamKind::Video => {
                    format!("xfade=transition=fade:duration={duration:.3}:offset={offset:.3}")
                }
                StreamKind::Audio => format!("acrossfade=d={duration:.3}"),
            },
            StageOp::Mux => String::new(),
        }
    }
}

/// One node of a render graph.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStage {
    pub op: StageOp,
    pub inputs: Vec<StreamRef>,
    /// Output label; `None` only for the mux stage.
    pub output: Option<String>,
}

/// Stages of one render pass over `input_count` input files.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderGraph {
    input_count: usize,
    stages: Vec<RenderStage>,
}

impl RenderGraph {
    pub fn new(input_count: usize) -> Self {
        Self {
            input_count,
            stages: Vec::new(),
        }
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn stages(&self) -> &[RenderStage] {
        &self.stages
    }

    /// Append a stage and return a reference to its output.
    pub fn stage(&mut self, op: StageOp, inputs: Vec<StreamRef>, label: &str) -> StreamRef {
        self.stages.push(RenderStage {
            op,
            inputs,
            output: Some(label.to_string()),
        });
        StreamRef::stage(label)
    }

    /// Append a linear chain of single-input ops.
    ///
    /// Intermediate outputs are labelled `{label}_{i}`; the last one is `label`.
    pub fn chain(&mut self, input: StreamRef, ops: Vec<StageOp>, label: &str) -> StreamRef {
        let last = ops.len().saturating_sub(1);
        let mut current = input;
        for (i, op) in ops.into_iter().enumerate() {
            let name = if i == last {
                label.to_string()
            } else {
                format!("{label}_{i}")
            };
            current = self.stage(op, vec![current], &name);
        }
        current
    }

    /// Add the mux stage.
    pub fn mux(&mut self, video: Option<StreamRef>, audio: Option<StreamRef>) {
        self.stages.push(RenderStage {
            op: StageOp::Mux,
            inputs: video.into_iter().chain(audio).collect(),
            output: None,
        });
    }

    fn mux_stage(&self) -> Option<&RenderStage> {
        self.stages.iter().find(|s| s.op == StageOp::Mux)
    }

    /// Check the structural rules described in the module docs.
    pub fn validate(&self) -> MediaResult<()> {
        let mut kinds: HashMap<&str, StreamKind> = HashMap::new();
        let mut consumed: HashSet<&str> = HashSet::new();
        let mut mux_count = 0;

        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.op.name();
            if !stage.op.arity_ok(stage.inputs.len()) {
                return Err(MediaError::invalid_graph(format!(
                    "stage {i} ({name}) has {} inputs",
                    stage.inputs.len()
                )));
            }

            let mut input_kinds = Vec::with_capacity(stage.inputs.len());
            for input in &stage.inputs {
                let kind = match input {
                    StreamRef::Source { input: idx, kind } => {
                        if *idx >= self.input_count {
                            return Err(MediaError::invalid_graph(format!(
                                "stage {i} ({name}) reads input {idx} of {}",
                                self.input_count
                            )));
                        }
                        *kind
                    }
                    StreamRef::Stage(label) => {
                        let kind = kinds.get(label.as_str()).copied().ok_or_else(|| {
                            MediaError::invalid_graph(format!(
                                "stage {i} ({name}) uses [{label}] before it is defined"
                            ))
                        })?;
                        if !consumed.insert(label.as_str()) {
                            return Err(MediaError::invalid_graph(format!(
                                "[{label}] is consumed more than once"
                            )));
                        }
                        kind
                    }
                };
                input_kinds.push(kind);
            }

            match (stage.op.kind(), &stage.output) {
                (Some(kind), Some(label)) => {
                    if let Some(bad) = input_kinds.iter().find(|k| **k != kind) {
                        return Err(MediaError::invalid_graph(format!(
                            "stage {i} ({name}) produces {kind:?} but reads {bad:?}"
                        )));
                    }
                    if kinds.insert(label.as_str(), kind).is_some() {
                        return Err(MediaError::invalid_graph(format!(
                            "label [{label}] defined twice"
                        )));
                    }
                }
                (None, None) => {
                    mux_count += 1;
                    let videos = input_kinds.iter().filter(|k| **k == StreamKind::Video).count();
                    if videos > 1 || input_kinds.len() - videos > 1 {
                        return Err(MediaError::invalid_graph(
                            "mux takes at most one video and one audio stream",
                        ));
                    }
                }
                _ => {
                    return Err(MediaError::invalid_graph(format!(
                        "stage {i} ({name}) has a missing or unexpected output label"
                    )));
                }
            }
        }

        if mux_count != 1 {
            return Err(MediaError::invalid_graph(format!(
                "expected exactly one mux stage, found {mux_count}"
            )));
        }

        let mut dangling: Vec<&str> = kinds
            .keys()
            .filter(|label| !consumed.contains(*label))
            .copied()
            .collect();
        if !dangling.is_empty() {
            dangling.sort_unstable();
            return Err(MediaError::invalid_graph(format!(
                "unconsumed outputs: {}",
                dangling.join(", ")
            )));
        }

        Ok(())
    }

    /// Stream kinds the mux stage writes to the output.
    pub fn output_kinds(&self) -> (bool, bool) {
        let Some(mux) = self.mux_stage() else {
            return (false, false);
        };
        let kind_of = |r: &StreamRef| match r {
            StreamRef::Source { kind, .. } => Some(*kind),
            StreamRef::Stage(label) => self
                .stages
                .iter()
                .find(|s| s.output.as_deref() == Some(label.as_str()))
                .and_then(|s| s.op.kind()),
        };
        let kinds: Vec<_> = mux.inputs.iter().filter_map(kind_of).collect();
        (
            kinds.contains(&StreamKind::Video),
            kinds.contains(&StreamKind::Audio),
        )
    }

    /// Render the filter stages as a `-filter_complex` value.
    ///
    /// Returns `None` when the graph is a bare mux of source streams.
    pub fn to_filter_complex(&self) -> Option<String> {
        let chains: Vec<String> = self
            .stages
            .iter()
            .filter(|s| s.op != StageOp::Mux)
            .map(|s| {
                let inputs: String = s.inputs.iter().map(|r| r.to_string()).collect();
                let output = s.output.as_deref().unwrap_or_default();
                format!("{inputs}{}[{output}]", s.op.filter(s.inputs.len()))
            })
            .collect();

        if chains.is_empty() {
            None
        } else {
            Some(chains.join(";"))
        }
    }

    /// `-map` arguments for the mux stage.
    pub fn map_args(&self) -> Vec<String> {
        self.mux_stage()
            .map(|mux| {
                mux.inputs
                    .iter()
                    .flat_map(|r| ["-map".to_string(), r.map_target()])
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_graph() -> RenderGraph {
        let mut g = RenderGraph::new(2);
        let top = g.chain(
            StreamRef::video(0),
            vec![
                StageOp::Normalize {
                    kind: StreamKind::Video,
                    fps: None,
                },
                StageOp::Scale {
                    width: "1080".into(),
                    height: "960".into(),
                    fit: ScaleFit::Decrease,
                },
            ],
            "top",
        );
        let bottom = g.stage(
            StageOp::Normalize {
                kind: StreamKind::Video,
                fps: None,
            },
            vec![StreamRef::video(1)],
            "bottom",
        );
        let v = g.stage(
            StageOp::Stack {
                axis: StackAxis::Vertical,
            },
            vec![top, bottom],
            "outv",
        );
        let a = g.stage(
            StageOp::Mix {
                normalize: false,
                duration: MixDuration::Longest,
            },
            vec![StreamRef::audio(0), StreamRef::audio(1)],
            "aout",
        );
        g.mux(Some(v), Some(a));
        g
    }

    #[test]
    fn test_render_filter_complex() {
        let g = simple_graph();
        g.validate().unwrap();
        assert_eq!(
            g.to_filter_complex().unwrap(),
            "[0:v]setpts=PTS-STARTPTS[top_0];\
             [top_0]scale=1080:960:force_original_aspect_ratio=decrease[top];\
             [1:v]setpts=PTS-STARTPTS[bottom];\
             [top][bottom]vstack=inputs=2[outv];\
             [0:a][1:a]amix=inputs=2:duration=longest:normalize=0[aout]"
        );
        assert_eq!(g.map_args(), vec!["-map", "[outv]", "-map", "[aout]"]);
        assert_eq!(g.output_kinds(), (true, true));
    }

    #[test]
    fn test_rejects_use_before_definition() {
        let mut g = RenderGraph::new(1);
        g.stage(StageOp::Resample, vec![StreamRef::stage("later")], "aout");
        g.stage(StageOp::Resample, vec![StreamRef::audio(0)], "later");
        g.mux(None, Some(StreamRef::stage("aout")));
        let err = g.validate().unwrap_err();
        assert!(err.to_string().contains("before it is defined"));
    }

    #[test]
    fn test_rejects_double_consumption_and_dangling() {
        let mut g = RenderGraph::new(1);
        let a = g.stage(StageOp::Resample, vec![StreamRef::audio(0)], "a");
        g.stage(StageOp::Pan { layout: "mono|c0=c0".into() }, vec![a.clone()], "p1");
        g.stage(StageOp::Pan { layout: "mono|c0=c0".into() }, vec![a], "p2");
        g.mux(None, Some(StreamRef::stage("p1")));
        assert!(g.validate().unwrap_err().to_string().contains("more than once"));

        let mut g = RenderGraph::new(1);
        g.stage(StageOp::Resample, vec![StreamRef::audio(0)], "unused");
        let v = g.stage(StageOp::Format { pix_fmt: "yuv420p".into() }, vec![StreamRef::video(0)], "outv");
        g.mux(Some(v), None);
        assert!(g.validate().unwrap_err().to_string().contains("unconsumed outputs: unused"));
    }

    #[test]
    fn test_rejects_kind_mismatch_and_bad_input() {
        let mut g = RenderGraph::new(1);
        let v = g.stage(StageOp::Resample, vec![StreamRef::video(0)], "aout");
        g.mux(None, Some(v));
        assert!(g.validate().unwrap_err().to_string().contains("produces Audio"));

        let mut g = RenderGraph::new(1);
        let v = g.stage(StageOp::Format { pix_fmt: "rgba".into() }, vec![StreamRef::video(3)], "outv");
        g.mux(Some(v), None);
        assert!(g.validate().unwrap_err().to_string().contains("reads input 3"));
    }

    #[test]
    fn test_requires_single_mux_with_one_stream_per_kind() {
        let mut g = RenderGraph::new(1);
        g.stage(StageOp::Format { pix_fmt: "rgba".into() }, vec![StreamRef::video(0)], "outv");
        assert!(g.validate().unwrap_err().to_string().contains("exactly one mux"));

        let mut g = RenderGraph::new(2);
        g.mux(Some(StreamRef::video(0)), Some(StreamRef::video(1)));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_bare_mux_has_no_filter() {
        let mut g = RenderGraph::new(2);
        g.mux(Some(StreamRef::video(0)), Some(StreamRef::audio(1)));
        g.validate().unwrap();
        assert!(g.to_filter_complex().is_none());
        assert_eq!(g.map_args(), vec!["-map", "0:v", "-map", "1:a"]);
    }

    #[test]
    fn test_op_filters() {
        let trim = StageOp::Trim {
            kind: StreamKind::Audio,
            start: 0.0,
            duration: Some(10.0),
        };
        assert_eq!(trim.filter(1), "atrim=start=0.000:duration=10.000,asetpts=PTS-STARTPTS");

        let xfade = StageOp::Crossfade {
            kind: StreamKind::Video,
            duration: 1.0,
            offset: 9.0,
        };
        assert_eq!(xfade.filter(2), "xfade=transition=fade:duration=1.000:offset=9.000");

        let alpha = StageOp::Alpha {
            opacity: 0.7,
            mode: AlphaMode::Lut,
        };
        assert_eq!(alpha.filter(1), "lut=a='val*0.70'");

        assert_eq!(StageOp::Delay { millis: 5200 }.filter(1), "adelay=delays=5200:all=1");
    }
}
