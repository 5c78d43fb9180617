//! Artifact store backed by local directories.
//!
//! Layout:
//! - `work_dir/<task_id>/` scratch space for downloads and the in-progress render
//! - `output_dir/<task_id>_composed.mp4` published artifacts served at `/video/<name>`

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use broll_models::{output_file_name, TaskId, OUTPUT_SUFFIX};

use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{move_file, PARTIAL_SUFFIX};

/// A published artifact found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// Reject names that could escape the output directory or that were not
/// produced by this service.
pub fn validate_filename(name: &str) -> StorageResult<()> {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(StorageError::invalid_filename(name));
    }
    match name.strip_suffix(OUTPUT_SUFFIX) {
        Some(stem) if !stem.is_empty() => Ok(()),
        _ => Err(StorageError::invalid_filename(name)),
    }
}

/// Local artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    work_dir: PathBuf,
    output_dir: PathBuf,
    public_base_url: String,
}

impl ArtifactStore {
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Create the work and output directories.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.work_dir).await?;
        fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// Scratch directory for a task.
    pub fn scratch_dir(&self, task_id: &TaskId) -> PathBuf {
        self.work_dir.join(task_id.to_string())
    }

    /// Create (or reuse) the scratch directory for a task.
    pub async fn create_scratch(&self, task_id: &TaskId) -> StorageResult<PathBuf> {
        let dir = self.scratch_dir(task_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Remove a task's scratch directory. Missing directories are fine.
    pub async fn remove_scratch(&self, task_id: &TaskId) -> StorageResult<()> {
        let dir = self.scratch_dir(task_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(task_id = %task_id, "Removed scratch directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Path an artifact name maps to, without checking existence.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Move a rendered file into the output directory.
    ///
    /// Returns the artifact name (`<task_id>_composed.mp4`). On failure no
    /// artifact is left behind.
    pub async fn publish(&self, task_id: &TaskId, rendered: &Path) -> StorageResult<String> {
        let name = output_file_name(task_id);
        let dest = self.artifact_path(&name);

        if let Err(e) = move_file(rendered, &dest).await {
            let _ = fs::remove_file(&dest).await;
            return Err(StorageError::publish_failed(format!("{}: {}", name, e)));
        }

        info!(task_id = %task_id, artifact = %name, "Published artifact");
        Ok(name)
    }

    /// Resolve a client-supplied name to an existing artifact file.
    pub async fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        validate_filename(name)?;

        let path = self.artifact_path(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(StorageError::not_found(name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an artifact. Returns whether a file was actually removed;
    /// deleting a missing artifact is not an error.
    pub async fn delete_artifact(&self, name: &str) -> StorageResult<bool> {
        validate_filename(name)?;

        match fs::remove_file(self.artifact_path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", name, e))),
        }
    }

    /// Public download URL for an artifact.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/video/{}", self.public_base_url, name)
    }

    /// List published artifacts with their modification times.
    pub async fn list_artifacts(&self) -> StorageResult<Vec<ArtifactEntry>> {
        self.scan_output(|name| validate_filename(name).is_ok()).await
    }

    /// Delete copies left behind by an interrupted cross-device publish,
    /// if they were last modified at or before `cutoff`.
    pub async fn remove_stale_partials(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let partials = self
            .scan_output(|name| {
                name.strip_suffix(PARTIAL_SUFFIX)
                    .is_some_and(|artifact| validate_filename(artifact).is_ok())
            })
            .await?;

        let mut removed = 0;
        for entry in partials.into_iter().filter(|e| e.modified <= cutoff) {
            match fs::remove_file(&entry.path).await {
                Ok(()) => {
                    debug!(file = %entry.name, "Removed stale partial copy");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::delete_failed(format!("{}: {}", entry.name, e))),
            }
        }
        Ok(removed)
    }

    async fn scan_output(&self, keep: impl Fn(&str) -> bool) -> StorageResult<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.output_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !keep(&name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!(artifact = %name, "Failed to stat artifact: {}", e);
                    continue;
                }
            };
            let modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
            entries.push(ArtifactEntry {
                name,
                path: entry.path(),
                modified,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::new(dir.path().join("work"), dir.path().join("out"), "http://localhost:8000/")
    }

    #[test]
    fn test_validate_filename() {
        tokio_test::assert_ok!(validate_filename("abc_composed.mp4"));
        tokio_test::assert_err!(validate_filename("../etc/passwd_composed.mp4"));
        tokio_test::assert_err!(validate_filename("a/b_composed.mp4"));
        tokio_test::assert_err!(validate_filename("a\\b_composed.mp4"));
        tokio_test::assert_err!(validate_filename("video.mp4"));
        tokio_test::assert_err!(validate_filename("_composed.mp4"));
    }

    #[test]
    fn test_public_url() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            store(&dir).public_url("x_composed.mp4"),
            "http://localhost:8000/video/x_composed.mp4"
        );
    }

    #[tokio::test]
    async fn test_publish_and_resolve() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        let id = TaskId::new();
        let scratch = store.create_scratch(&id).await.unwrap();
        let rendered = scratch.join("render.mp4");
        fs::write(&rendered, b"mp4").await.unwrap();

        let name = store.publish(&id, &rendered).await.unwrap();
        assert_eq!(name, format!("{}_composed.mp4", id));
        assert!(!rendered.exists());

        let path = store.resolve(&name).await.unwrap();
        assert_eq!(fs::read(path).await.unwrap(), b"mp4");
    }

    #[tokio::test]
    async fn test_publish_missing_render_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        let id = TaskId::new();
        let err = store.publish(&id, &dir.path().join("missing.mp4")).await.unwrap_err();
        assert!(matches!(err, StorageError::PublishFailed(_)));
        assert!(store.list_artifacts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_rejects_unknown_and_invalid() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        assert!(matches!(
            store.resolve("nope_composed.mp4").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.resolve("..%2f_composed.mp4/..").await,
            Err(StorageError::InvalidFilename(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        let name = "t_composed.mp4";
        fs::write(store.artifact_path(name), b"x").await.unwrap();

        assert!(store.delete_artifact(name).await.unwrap());
        assert!(!store.delete_artifact(name).await.unwrap());
    }

    #[tokio::test]
    async fn test_scratch_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let id = TaskId::new();

        let scratch = store.create_scratch(&id).await.unwrap();
        fs::write(scratch.join("source_0.mp4"), b"x").await.unwrap();

        store.remove_scratch(&id).await.unwrap();
        assert!(!scratch.exists());
        store.remove_scratch(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_artifacts_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        fs::write(store.artifact_path("a_composed.mp4"), b"x").await.unwrap();
        fs::write(store.artifact_path("notes.txt"), b"x").await.unwrap();

        let listed = store.list_artifacts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a_composed.mp4");
    }

    #[tokio::test]
    async fn test_remove_stale_partials() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.ensure_dirs().await.unwrap();

        let partial = format!("abc_composed.mp4{}", PARTIAL_SUFFIX);
        fs::write(store.artifact_path(&partial), b"half").await.unwrap();
        fs::write(store.artifact_path("abc_composed.mp4"), b"mp4").await.unwrap();
        fs::write(store.artifact_path("notes.txt.partial"), b"x").await.unwrap();

        // Too recent: an in-flight move may still own it.
        let removed = store
            .remove_stale_partials(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store
            .remove_stale_partials(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!store.artifact_path(&partial).exists());
        assert!(store.artifact_path("abc_composed.mp4").exists());
        assert!(store.artifact_path("notes.txt.partial").exists());
    }
}
