//! Input acquisition through a content-addressed local cache.
//!
//! Each remote key maps to `<cache_dir>/<sha256(bucket/path)><ext>`. Misses
//! download into a unique temp file next to the cache entry and are published
//! with [`publish_file`], so concurrent workers on one host never observe a
//! half-written entry and the first complete download wins. Entries are never
//! evicted; keys are treated as immutable.

use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use metrics::counter;
use reelsync_media::fs_utils::publish_file;
use reelsync_models::{ClipRef, RemoteKey};
use reelsync_storage::ObjectStore;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::{WorkerError, WorkerResult};

/// Fingerprint of a remote key: hex SHA-256 of `bucket/path`.
pub fn fingerprint(key: &RemoteKey) -> String {
    format!("{:x}", Sha256::digest(key.qualified().as_bytes()))
}

/// Local cache of remote inputs.
pub struct InputCache<S> {
    store: S,
    cache_dir: PathBuf,
}

impl<S: ObjectStore> InputCache<S> {
    pub fn new(store: S, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file for `key`.
    pub fn entry_path(&self, key: &RemoteKey) -> PathBuf {
        let ext = key.extension().unwrap_or_default();
        self.cache_dir.join(format!("{}{}", fingerprint(key), ext))
    }

    /// Make sure `key` is in the cache. Returns the entry and whether it was a hit.
    pub async fn ensure_cached(&self, key: &RemoteKey) -> WorkerResult<(PathBuf, bool)> {
        let entry = self.entry_path(key);
        if is_populated(&entry).await {
            counter!("reelsync_cache_hits_total").increment(1);
            debug!(key = %key.qualified(), entry = %entry.display(), "cache hit");
            return Ok((entry, true));
        }

        counter!("reelsync_cache_misses_total").increment(1);
        fs::create_dir_all(&self.cache_dir).await?;

        let tmp = self.cache_dir.join(format!(
            ".{}.{}.download",
            fingerprint(key),
            uuid::Uuid::new_v4().simple()
        ));

        info!(key = %key.qualified(), "fetching input");
        let bytes = match self.store.download_file(key, &tmp).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(WorkerError::acquisition(key.qualified(), e));
            }
        };

        let placed = publish_file(&tmp, &entry)
            .await
            .map_err(|e| WorkerError::acquisition(key.qualified(), e))?;
        if placed {
            info!(key = %key.qualified(), bytes, "cached input");
        } else {
            debug!(key = %key.qualified(), "another writer cached this input first");
        }

        Ok((entry, false))
    }

    /// Resolve one clip to a private copy inside `workspace`.
    #[instrument(skip_all, fields(clip = %clip.key.qualified()))]
    pub async fn resolve(
        &self,
        clip: &ClipRef,
        index: usize,
        workspace: &Path,
    ) -> WorkerResult<PathBuf> {
        let (entry, _) = self.ensure_cached(&clip.key).await?;

        let ext = clip.key.extension().unwrap_or_default();
        let local = workspace.join(format!("input_{index}{ext}"));
        fs::copy(&entry, &local)
            .await
            .map_err(|e| WorkerError::acquisition(clip.key.qualified(), e))?;

        Ok(local)
    }

    /// Resolve every clip of a job concurrently, preserving order.
    pub async fn resolve_all(
        &self,
        clips: &[ClipRef],
        workspace: &Path,
    ) -> WorkerResult<Vec<PathBuf>> {
        fs::create_dir_all(workspace).await?;
        let paths = try_join_all(
            clips
                .iter()
                .enumerate()
                .map(|(i, clip)| self.resolve(clip, i, workspace)),
        )
        .await;

        if let Err(e) = &paths {
            warn!(error = %e, "input acquisition failed");
        }
        paths
    }
}

async fn is_populated(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use reelsync_models::Orientation;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn clip(path: &str, offset: f64) -> ClipRef {
        ClipRef::new(
            RemoteKey::new("media", path).unwrap(),
            Orientation::Portrait,
            offset,
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable_and_key_scoped() {
        let a = RemoteKey::new("media", "cams/a.mp4").unwrap();
        let b = RemoteKey::new("other", "cams/a.mp4").unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[tokio::test]
    async fn test_second_resolve_does_not_fetch() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.insert("media/cams/a.mp4", b"camera-a");
        let cache = InputCache::new(store.clone(), dir.path().join("cache"));

        let first = cache.resolve(&clip("cams/a.mp4", 0.0), 0, &dir.path().join("job1")).await.unwrap();
        let second = cache.resolve(&clip("cams/a.mp4", 0.0), 0, &dir.path().join("job2")).await.unwrap();

        assert_eq!(store.downloads(), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"camera-a");
        assert_eq!(std::fs::read(&second).unwrap(), b"camera-a");
        assert!(cache.entry_path(&clip("cams/a.mp4", 0.0).key).exists());
    }

    #[tokio::test]
    async fn test_resolve_all_keeps_order_and_separates_copies() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.insert("media/a.mp4", b"A");
        store.insert("media/b.mp4", b"B");
        let cache = InputCache::new(store.clone(), dir.path().join("cache"));
        let workspace = dir.path().join("job");

        let paths = cache
            .resolve_all(&[clip("a.mp4", 0.0), clip("b.mp4", 1.5)], &workspace)
            .await
            .unwrap();

        assert_eq!(paths, vec![workspace.join("input_0.mp4"), workspace.join("input_1.mp4")]);
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"B");
    }

    #[tokio::test]
    async fn test_missing_remote_is_acquisition_failure_naming_clip() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let cache = InputCache::new(store, dir.path().join("cache"));

        let err = cache
            .resolve(&clip("gone.mp4", 0.0), 0, dir.path())
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("media/gone.mp4"));
        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("cache")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_misses_publish_one_entry() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.insert("media/a.mp4", b"same-bytes");
        let cache = Arc::new(InputCache::new(store.clone(), dir.path().join("cache")));
        let key = RemoteKey::new("media", "a.mp4").unwrap();

        let (a, b) = tokio::join!(cache.ensure_cached(&key), cache.ensure_cached(&key));
        assert_eq!(a.unwrap().0, b.unwrap().0);

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read(cache.entry_path(&key)).unwrap(), b"same-bytes");
    }
}
