//! Branding logo overlay.
//!
//! The logo is a PNG with transparency passed to the pass as its own input.
//! Each layout has a preset for size, opacity and margin.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::graph::{AlphaMode, RenderGraph, ScaleFit, StageOp, StreamRef};
use crate::layout::Layout;

/// Default logo asset path in the production container.
pub const DEFAULT_LOGO_PATH: &str = "/app/assets/logo.png";

/// How the logo is sized.
#[derive(Debug, Clone, PartialEq)]
pub enum LogoSize {
    /// Fraction of the canvas width; height follows aspect ratio.
    CanvasFraction { canvas_width: u32, fraction: f64 },
    /// Fraction of the logo's own width.
    SelfFraction(f64),
    /// Fit inside a box, keeping aspect ratio.
    FitBox { width: String, height: u32 },
}

impl LogoSize {
    fn scale_op(&self) -> StageOp {
        match self {
            LogoSize::CanvasFraction {
                canvas_width,
                fraction,
            } => StageOp::Scale {
                width: ((*canvas_width as f64) * fraction).trunc().to_string(),
                height: "-1".to_string(),
                fit: ScaleFit::Exact,
            },
            LogoSize::SelfFraction(fraction) => StageOp::Scale {
                width: format!("iw*{fraction:.2}"),
                height: "-1".to_string(),
                fit: ScaleFit::Exact,
            },
            LogoSize::FitBox { width, height } => StageOp::Scale {
                width: width.clone(),
                height: height.to_string(),
                fit: ScaleFit::Decrease,
            },
        }
    }
}

/// Logo overlay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LogoConfig {
    pub image_path: PathBuf,
    pub size: LogoSize,
    /// 0.0 to 1.0
    pub opacity: f64,
    pub alpha_mode: AlphaMode,
    /// Distance from the right and bottom edges in pixels
    pub margin: u32,
}

impl LogoConfig {
    /// Preset for a layout.
    pub fn for_layout(layout: &Layout, image_path: impl AsRef<Path>) -> Self {
        let image_path = image_path.as_ref().to_path_buf();
        match layout {
            Layout::DualPortrait => Self {
                image_path,
                size: LogoSize::CanvasFraction {
                    canvas_width: 1920,
                    fraction: 0.18,
                },
                opacity: 0.7,
                alpha_mode: AlphaMode::Lut,
                margin: 48,
            },
            Layout::DualLandscape => Self {
                image_path,
                size: LogoSize::FitBox {
                    width: "403.5".to_string(),
                    height: 60,
                },
                opacity: 0.25,
                alpha_mode: AlphaMode::ChannelMixer,
                margin: 10,
            },
            Layout::Mixed(_) | Layout::SequentialThree => Self {
                image_path,
                size: LogoSize::SelfFraction(0.30),
                opacity: 0.5,
                alpha_mode: AlphaMode::Lut,
                margin: 40,
            },
        }
    }

    /// Check if the logo image exists.
    pub fn is_available(&self) -> bool {
        self.image_path.exists()
    }

    /// Append logo stages to `graph`, overlaying input `logo_input` onto
    /// `base`. The result is labelled `label`.
    pub fn attach(
        &self,
        graph: &mut RenderGraph,
        base: StreamRef,
        logo_input: usize,
        label: &str,
    ) -> StreamRef {
        let logo = graph.chain(
            StreamRef::video(logo_input),
            vec![
                self.size.scale_op(),
                StageOp::Format {
                    pix_fmt: "rgba".to_string(),
                },
                StageOp::Alpha {
                    opacity: self.opacity,
                    mode: self.alpha_mode,
                },
            ],
            "logo",
        );
        graph.stage(
            StageOp::Overlay {
                x: format!("W-w-{}", self.margin),
                y: format!("H-h-{}", self.margin),
            },
            vec![base, logo],
            label,
        )
    }
}

/// Preset for `layout` when the logo file exists, `None` otherwise.
pub fn resolve_logo(layout: &Layout, image_path: Option<&Path>) -> Option<LogoConfig> {
    let path = image_path?;
    let config = LogoConfig::for_layout(layout, path);
    if config.is_available() {
        Some(config)
    } else {
        warn!(path = %path.display(), "logo image not found, rendering without logo");
        None
    }
}
