//! Object store abstraction.

use async_trait::async_trait;
use reelsync_models::RemoteKey;
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageResult;

/// Get/put by key against remote storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` into `dest`, returning the number of bytes written.
    async fn download_file(&self, key: &RemoteKey, dest: &Path) -> StorageResult<u64>;

    /// Upload the file at `path` to `key`.
    async fn upload_file(&self, path: &Path, key: &RemoteKey, content_type: &str)
        -> StorageResult<()>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn download_file(&self, key: &RemoteKey, dest: &Path) -> StorageResult<u64> {
        (**self).download_file(key, dest).await
    }

    async fn upload_file(
        &self,
        path: &Path,
        key: &RemoteKey,
        content_type: &str,
    ) -> StorageResult<()> {
        (**self).upload_file(path, key, content_type).await
    }
}

/// MIME type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "m4a" => "audio/mp4",
        "log" | "txt" => "text/plain; charset=utf-8",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("/o/final.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("run.log")), "text/plain; charset=utf-8");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
