//! Filesystem helpers for render outputs and cached inputs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move a file from `src` to `dst`, replacing `dst`.
///
/// Tries a rename first. When the two paths live on different filesystems it
/// copies into a sibling temp file of `dst`, renames that into place, then
/// removes `src`.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "cross-device rename, copying instead"
            );
            let staged = sibling_temp_path(dst);
            fs::copy(src, &staged).await?;
            if let Err(e) = fs::rename(&staged, dst).await {
                let _ = fs::remove_file(&staged).await;
                return Err(MediaError::from(e));
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!(src = %src.display(), error = %e, "failed to remove moved source");
            }
            Ok(())
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Publish a fully written temp file at `dst` unless something is already there.
///
/// Returns `true` when this call placed the file and `false` when another
/// writer got there first; in that case the temp file is removed. `tmp` and
/// `dst` must be on the same filesystem.
pub async fn publish_file(tmp: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<bool> {
    let tmp = tmp.as_ref();
    let dst = dst.as_ref();

    match fs::hard_link(tmp, dst).await {
        Ok(()) => {
            let _ = fs::remove_file(tmp).await;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let _ = fs::remove_file(tmp).await;
            Ok(false)
        }
        // Filesystems without hard links: fall back to a plain rename.
        Err(e) if e.kind() == ErrorKind::Unsupported || e.raw_os_error() == Some(1) => {
            if fs::try_exists(dst).await? {
                let _ = fs::remove_file(tmp).await;
                return Ok(false);
            }
            fs::rename(tmp, dst).await?;
            Ok(true)
        }
        Err(e) => {
            let _ = fs::remove_file(tmp).await;
            Err(MediaError::from(e))
        }
    }
}

/// Path next to `path` used to stage a write, e.g. `out.partial.mp4`.
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    path.with_file_name(name)
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}
