use std::io;
use std::path::{Path, PathBuf};
use humansize::{format_size, BINARY};
use log::{debug, info, warn};
use crate::error::{GrabError, GrabResult};
use crate::workspace;

/// A media file produced by an external process and owned by the pipeline
/// until it is handed to the next stage or deleted.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl Artifact {
    /// Track an existing file, recording its current size
    pub async fn from_path(path: impl Into<PathBuf>) -> GrabResult<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| GrabError::io(format!("Failed to stat {}", path.display()), e))?;

        Ok(Self {
            path,
            size_bytes: metadata.len(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn human_size(&self) -> String {
        format_size(self.size_bytes, BINARY)
    }
}

/// Result of a best-effort delete. Never a job failure.
#[derive(Debug)]
pub enum CleanupStatus {
    Removed,
    AlreadyGone,
    Failed(io::Error),
}

impl CleanupStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Delete a finished artifact together with its job directory once that
/// is empty. Failures are logged, not propagated.
pub async fn cleanup(artifact: Artifact) -> CleanupStatus {
    let status = cleanup_path(&artifact.path).await;
    if let Some(dir) = artifact.path.parent() {
        workspace::release_dir(dir).await;
    }
    status
}

/// Delete a file the pipeline may have left behind
pub async fn cleanup_path(path: &Path) -> CleanupStatus {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("Deleted temporary file: {}", display_name(path));
            CleanupStatus::Removed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Temporary file already gone: {}", path.display());
            CleanupStatus::AlreadyGone
        }
        Err(e) => {
            warn!("Failed to delete temporary file {}: {}", path.display(), e);
            CleanupStatus::Failed(e)
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_path_records_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let artifact = Artifact::from_path(&path).await.unwrap();
        assert_eq!(artifact.size_bytes, 4096);
        assert_eq!(artifact.file_name(), "clip.mp4");
        assert!(artifact.human_size().contains("KiB"));
    }

    #[tokio::test]
    async fn test_from_missing_path_is_io_error() {
        let err = Artifact::from_path("/nonexistent/clip.mp4").await.unwrap_err();
        assert!(matches!(err, GrabError::Io { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();
        let artifact = Artifact::from_path(&path).await.unwrap();

        assert!(matches!(cleanup(artifact).await, CleanupStatus::Removed));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_releases_job_dir() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace::JobWorkspace::create(root.path(), true).await.unwrap();
        let path = ws.dir().join("compressed_clip.mp4");
        std::fs::write(&path, b"data").unwrap();
        let artifact = Artifact::from_path(&path).await.unwrap();

        assert!(matches!(cleanup(artifact).await, CleanupStatus::Removed));
        assert!(!ws.dir().exists());
        assert!(root.path().exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_non_empty_job_dir() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace::JobWorkspace::create(root.path(), true).await.unwrap();
        let path = ws.dir().join("compressed_clip.mp4");
        std::fs::write(&path, b"data").unwrap();
        std::fs::write(ws.dir().join("clip.mp4.part"), b"x").unwrap();
        let artifact = Artifact::from_path(&path).await.unwrap();

        cleanup(artifact).await;
        assert!(ws.dir().join("clip.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_cleanup_of_missing_file_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let status = cleanup_path(&dir.path().join("gone.mp4")).await;
        assert!(matches!(status, CleanupStatus::AlreadyGone));
        assert!(!status.is_failed());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be removed with remove_file
        let status = cleanup_path(dir.path()).await;
        assert!(status.is_failed());
    }
}
