//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while moving objects between remote storage and local disk.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload to {key} failed: {reason}")]
    UploadFailed { key: String, reason: String },

    #[error("Download of {key} failed: {reason}")]
    DownloadFailed { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::UploadFailed {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn download_failed(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::DownloadFailed {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// The remote object does not exist (as opposed to a transport failure).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = StorageError::download_failed("media/cams/a.mp4", "connection reset");
        assert_eq!(
            err.to_string(),
            "Download of media/cams/a.mp4 failed: connection reset"
        );
        assert!(!err.is_not_found());
        assert!(StorageError::not_found("media/cams/a.mp4").is_not_found());
    }
}
