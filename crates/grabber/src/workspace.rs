use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use log::{debug, info, warn};
use uuid::Uuid;
use crate::config::GrabberConfig;
use crate::error::{GrabError, GrabResult};
use crate::scan::ArtifactLocator;

/// Name prefix of per-job scratch directories
pub const JOB_DIR_PREFIX: &str = "job-";

/// Scratch space of a single job.
///
/// With isolation on, every job gets its own `job-<uuid>` directory so that
/// concurrent jobs never see each other's files during the artifact scan.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
    dir: PathBuf,
}

impl JobWorkspace {
    /// Ensure `root` exists and allocate the job's directory inside it
    pub async fn create(root: &Path, isolate: bool) -> GrabResult<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| GrabError::io(format!("Failed to create work directory {}", root.display()), e))?;

        let dir = if isolate {
            let dir = root.join(format!("{}{}", JOB_DIR_PREFIX, Uuid::new_v4()));
            tokio::fs::create_dir(&dir)
                .await
                .map_err(|e| GrabError::io(format!("Failed to create job directory {}", dir.display()), e))?;
            debug!("Allocated job directory: {}", dir.display());
            dir
        } else {
            root.to_path_buf()
        };

        Ok(Self {
            root: root.to_path_buf(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_isolated(&self) -> bool {
        self.dir != self.root
    }
}

/// Remove a job directory once it is empty. Shared roots are never removed.
pub async fn release_dir(dir: &Path) {
    let is_job_dir = dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(JOB_DIR_PREFIX))
        .unwrap_or(false);
    if !is_job_dir {
        return;
    }

    // remove_dir refuses non-empty directories, which is what we want
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => debug!("Removed job directory: {}", dir.display()),
        Err(e) => debug!("Keeping job directory {}: {}", dir.display(), e),
    }
}

/// What a sweep of the work directory may delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Entries modified more recently than this may belong to a running job
    pub min_age: Duration,
    /// Also delete loose media files in the root. Only safe when the root
    /// is a dedicated shared scratch directory.
    pub loose_files: bool,
}

impl SweepPolicy {
    pub fn from_config(cfg: &GrabberConfig) -> Self {
        Self {
            min_age: cfg.orphan_age(),
            loose_files: !cfg.isolate_jobs,
        }
    }
}

/// Remove leftovers of interrupted jobs from the work directory.
///
/// Deletes `job-*` directories and, if the policy allows, loose media files,
/// as long as they are older than `policy.min_age`. Every failure is logged
/// and skipped. Returns the number of entries removed.
pub async fn sweep_orphans(root: &Path, policy: SweepPolicy) -> GrabResult<usize> {
    if !root.exists() {
        return Ok(0);
    }

    info!("🔍 Checking for orphaned files in {}...", root.display());

    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|e| GrabError::io(format!("Failed to list {}", root.display()), e))?;
    let locator = ArtifactLocator::default();
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading directory entry in {}: {}", root.display(), e);
                break;
            }
        };

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                continue;
            }
        };

        let is_job_dir = metadata.is_dir() && name.starts_with(JOB_DIR_PREFIX);
        let is_loose_media = policy.loose_files
            && metadata.is_file()
            && (locator.matches(&name) || is_transcoded_leftover(&name));
        if !is_job_dir && !is_loose_media {
            continue;
        }

        // A clock step backwards reads as "just modified"
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or(Duration::ZERO);
        if age < policy.min_age {
            debug!("Skipping {}: modified {}s ago, may be in use", path.display(), age.as_secs());
            continue;
        }

        let result = if is_job_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => {
                info!("🗑️  Removed orphan: {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove orphan {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

fn is_transcoded_leftover(name: &str) -> bool {
    name.starts_with(crate::scan::COMPRESSED_PREFIX)
}
