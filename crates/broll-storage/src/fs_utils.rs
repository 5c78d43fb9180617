//! Filesystem helpers for moving artifacts between directories that may
//! live on different filesystems.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::StorageResult;

/// Suffix of the temporary file a cross-device move copies into.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Move `src` to `dst`, falling back to copy-and-rename on EXDEV.
///
/// The destination either appears complete or not at all: the copy goes to
/// a sibling `.partial` file that is renamed into place, and is removed if
/// any step fails.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_then_rename(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// EXDEV is 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    dst.with_file_name(name)
}

async fn copy_then_rename(src: &Path, dst: &Path) -> StorageResult<()> {
    let tmp = partial_path(dst);

    if let Err(e) = fs::copy(src, &tmp).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp, dst).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Failed to remove {} after cross-device move: {}", src.display(), e);
    }

    Ok(())
}
