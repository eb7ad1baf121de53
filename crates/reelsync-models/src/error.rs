//! Validation errors raised while building models from untrusted input.

use thiserror::Error;

/// Result type for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors produced when a job or clip description is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("unsupported orientation '{0}' (expected 'portrait' or 'landscape')")]
    InvalidOrientation(String),

    #[error("invalid offset '{value}' for clip {clip}")]
    InvalidOffset { clip: String, value: String },

    #[error("malformed clip spec '{0}' (expected 'path:orientation:offset')")]
    MalformedClipSpec(String),

    #[error("invalid remote key: {0}")]
    InvalidKey(String),

    #[error("a job needs between {min} and {max} clips, got {got}")]
    ClipCount { min: usize, max: usize, got: usize },

    #[error("reference clip must have offset 0, got {0}")]
    ReferenceOffset(f64),

    #[error("job has no output key")]
    MissingOutput,

    #[error("job id '{0}' is not a single safe path component")]
    InvalidJobId(String),

    #[error("invalid segment duration: {0}")]
    InvalidSegmentDuration(f64),
}

impl ModelError {
    /// Create an invalid offset error.
    pub fn invalid_offset(clip: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidOffset {
            clip: clip.into(),
            value: value.to_string(),
        }
    }
}
