//! One render pass: input files, a render graph, encoding and an output.

use reelsync_models::EncodingConfig;
use std::path::{Path, PathBuf};

use crate::command::{CommandInput, FfmpegCommand};
use crate::error::MediaResult;
use crate::graph::RenderGraph;

/// An input file of a pass with its input-level seek and read limit.
#[derive(Debug, Clone, PartialEq)]
pub struct PassInput {
    pub path: PathBuf,
    pub seek: f64,
    pub duration: Option<f64>,
}

impl PassInput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seek: 0.0,
            duration: None,
        }
    }

    pub fn with_seek(mut self, seek: f64) -> Self {
        self.seek = seek;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// A single blocking engine invocation.
#[derive(Debug, Clone)]
pub struct RenderPass {
    /// Short name used in logs, e.g. `segment-2` or `compose`.
    pub name: String,
    pub inputs: Vec<PassInput>,
    pub graph: RenderGraph,
    pub encoding: EncodingConfig,
    /// Output duration clamp
    pub duration: Option<f64>,
    pub output: PathBuf,
}

impl RenderPass {
    /// Build the FFmpeg command writing to `output` (usually a staging path).
    ///
    /// The graph is validated first; an invalid graph never reaches the engine.
    pub fn to_command(&self, output: &Path) -> MediaResult<FfmpegCommand> {
        self.graph.validate()?;

        let mut cmd = FfmpegCommand::new(output);
        for input in &self.inputs {
            let mut ci = CommandInput::new(&input.path).seek(input.seek);
            if let Some(d) = input.duration {
                ci = ci.duration(d);
            }
            cmd = cmd.input(ci);
        }

        if let Some(filter) = self.graph.to_filter_complex() {
            cmd = cmd.filter_complex(filter);
        }
        cmd = cmd.output_args(self.graph.map_args());

        let encoding = &self.encoding;
        cmd = match self.graph.output_kinds() {
            (true, true) => cmd.output_args(encoding.to_ffmpeg_args()),
            (has_video, has_audio) => {
                let mut args = if has_video {
                    encoding.video_args()
                } else {
                    vec!["-vn".to_string()]
                };
                if has_audio {
                    args.extend(encoding.audio_args());
                } else {
                    args.push("-an".to_string());
                }
                args.extend(["-movflags".to_string(), "+faststart".to_string()]);
                args.extend(encoding.extra_args.iter().cloned());
                cmd.output_args(args)
            }
        };

        if let Some(d) = self.duration {
            cmd = cmd.output_duration(d);
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StageOp, StreamRef};

    #[test]
    fn test_audio_only_pass() {
        let mut graph = RenderGraph::new(1);
        let a = graph.stage(StageOp::Resample, vec![StreamRef::audio(0)], "aout");
        graph.mux(None, Some(a));

        let pass = RenderPass {
            name: "audio".into(),
            inputs: vec![PassInput::new("/w/a.mp4").with_seek(1.5).with_duration(30.0)],
            graph,
            encoding: EncodingConfig::default(),
            duration: Some(30.0),
            output: "/w/mix.m4a".into(),
        };
        let args = pass.to_command(Path::new("/w/mix.partial.m4a")).unwrap().build_args();
        let joined = args.join(" ");

        assert!(joined.contains("-ss 1.500 -t 30.000 -i /w/a.mp4"));
        assert!(joined.contains("-map [aout] -vn -c:a aac -b:a 192k"));
        assert!(!joined.contains("-c:v"));
        assert!(joined.ends_with("-t 30.000 /w/mix.partial.m4a"));
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let pass = RenderPass {
            name: "broken".into(),
            inputs: vec![PassInput::new("/w/a.mp4")],
            graph: RenderGraph::new(1),
            encoding: EncodingConfig::default(),
            duration: None,
            output: "/w/o.mp4".into(),
        };
        assert!(pass.to_command(Path::new("/w/o.mp4")).is_err());
    }
}
