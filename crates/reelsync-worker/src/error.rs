//! Worker error types.

use reelsync_media::MediaError;
use reelsync_models::ModelError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job was rejected before any fetch or render.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A clip could not be fetched into the local cache.
    #[error("Acquisition failed for {clip}: {message}")]
    Acquisition { clip: String, message: String },

    /// The render engine failed or timed out.
    #[error("Render failed: {0}")]
    Render(MediaError),

    /// The pipeline reported success but the artifact is not usable.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// The host is not fit to run jobs.
    #[error("Lifecycle failure: {0}")]
    Lifecycle(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reelsync_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] reelsync_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn acquisition(clip: impl Into<String>, msg: impl ToString) -> Self {
        Self::Acquisition {
            clip: clip.into(),
            message: msg.to_string(),
        }
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Acquisition { .. } => 3,
            Self::Render(_) => 4,
            Self::Integrity(_) => 5,
            Self::Lifecycle(_) => 6,
            Self::ConfigError(_) | Self::Storage(_) | Self::Queue(_) | Self::Io(_) => 1,
        }
    }
}

impl From<ModelError> for WorkerError {
    fn from(err: ModelError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Input problems found by the media layer are validation failures; anything
/// else it raises happened while rendering.
impl From<MediaError> for WorkerError {
    fn from(err: MediaError) -> Self {
        if err.is_validation() {
            Self::Validation(err.to_string())
        } else {
            Self::Render(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_failure_class() {
        let cases = [
            (WorkerError::validation("bad"), 2),
            (WorkerError::acquisition("b/a.mp4", "404"), 3),
            (WorkerError::Render(MediaError::Timeout(10)), 4),
            (WorkerError::integrity("missing"), 5),
            (WorkerError::lifecycle("no gpu"), 6),
            (WorkerError::config_error("x"), 1),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{err}");
        }
    }

    #[test]
    fn test_media_validation_maps_to_validation() {
        let err: WorkerError = MediaError::validation("overlap is empty").into();
        assert!(matches!(err, WorkerError::Validation(_)));

        let err: WorkerError = MediaError::ffmpeg_failed("boom", None, Some(1)).into();
        assert!(matches!(err, WorkerError::Render(_)));
    }

    #[test]
    fn test_model_error_maps_to_validation() {
        let err: WorkerError = ModelError::InvalidOrientation("square".into()).into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("square"));
    }
}
