use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::artifact::Artifact;
use crate::error::{GrabError, GrabResult};

/// Container extensions the downloader is expected to produce
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

/// File name marker of transcoder output
pub const COMPRESSED_PREFIX: &str = "compressed_";

/// Scans a working directory for a freshly produced media file.
///
/// The downloader derives the final file name from video metadata, so the
/// exact name is unknown and the directory has to be searched.
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    extensions: Vec<String>,
    exclude_prefix: String,
}

impl Default for ArtifactLocator {
    fn default() -> Self {
        Self::new(VIDEO_EXTENSIONS, COMPRESSED_PREFIX)
    }
}

impl ArtifactLocator {
    pub fn new(extensions: &[&str], exclude_prefix: &str) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            exclude_prefix: exclude_prefix.to_string(),
        }
    }

    /// Whether a file name qualifies as a fresh, not yet transcoded download
    pub fn matches(&self, file_name: &str) -> bool {
        if file_name.starts_with(&self.exclude_prefix) {
            return false;
        }

        let ext = Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        match ext {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    /// Matching regular files directly inside `dir`, in directory-listing order
    pub fn candidates(&self, dir: &Path) -> GrabResult<Vec<PathBuf>> {
        let mut found = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                let context = format!("Failed to list {}", dir.display());
                match e.into_io_error() {
                    Some(io) => GrabError::io(context, io),
                    None => GrabError::io(context, std::io::Error::other("filesystem loop")),
                }
            })?;

            // Skip directories
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if self.matches(&name) {
                debug!("Found media file: {}", entry.path().display());
                found.push(entry.path().to_path_buf());
            }
        }

        Ok(found)
    }

    /// First candidate in `dir`, or `None` when nothing matches.
    ///
    /// More than one candidate means the directory is shared with another job;
    /// the first one is used and the rest are reported.
    pub async fn find(&self, dir: &Path) -> GrabResult<Option<Artifact>> {
        let locator = self.clone();
        let scan_dir = dir.to_path_buf();
        let mut candidates = tokio::task::spawn_blocking(move || locator.candidates(&scan_dir))
            .await
            .map_err(|e| GrabError::io("Artifact scan task failed", std::io::Error::other(e)))??;

        if candidates.is_empty() {
            return Ok(None);
        }
        if candidates.len() > 1 {
            warn!(
                "{} media files in {}, using the first; ignored: {:?}",
                candidates.len(),
                dir.display(),
                &candidates[1..]
            );
        }

        let path = candidates.swap_remove(0);
        let artifact = Artifact::from_path(path).await?;
        info!("Located artifact: {} ({})", artifact.file_name(), artifact.human_size());
        Ok(Some(artifact))
    }
}
