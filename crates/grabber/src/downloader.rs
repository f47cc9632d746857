//! Video download using an external yt-dlp compatible tool.
//!
//! The downloader only fetches; every downloaded file is then handed to the
//! [`Compressor`], so the caller only ever receives transcoded output.

use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{error, info, warn};
use crate::artifact::{self, Artifact};
use crate::compressor::Compressor;
use crate::config::GrabberConfig;
use crate::error::{GrabError, GrabResult};
use crate::process::{ProcessRunner, ProcessSpec};
use crate::scan::ArtifactLocator;
use crate::workspace::{self, JobWorkspace};

/// Output name template; the tool fills in title, id and container extension
pub const OUTPUT_TEMPLATE: &str = "%(title)s-[%(id)s].%(ext)s";

/// Container the tool merges separate video/audio streams into
pub const MERGE_OUTPUT_FORMAT: &str = "mp4";

/// Flags forwarded to the download tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadParams {
    pub format_selector: String,
    pub retries: u32,
    pub socket_timeout_secs: u64,
    pub extractor_retries: u32,
}

impl DownloadParams {
    pub fn from_config(cfg: &GrabberConfig) -> Self {
        Self {
            format_selector: cfg.format_selector.clone(),
            retries: cfg.retries,
            socket_timeout_secs: cfg.socket_timeout_secs,
            extractor_retries: cfg.extractor_retries,
        }
    }
}

/// Fetches a single video and returns it compressed
#[derive(Debug, Clone)]
pub struct Downloader {
    downloader_bin: PathBuf,
    params: DownloadParams,
    work_dir: PathBuf,
    isolate_jobs: bool,
    timeout: Duration,
    runner: ProcessRunner,
    locator: ArtifactLocator,
    compressor: Compressor,
}

impl Downloader {
    pub fn from_config(cfg: &GrabberConfig) -> Self {
        Self::with_runner(cfg, ProcessRunner::new())
    }

    pub fn with_runner(cfg: &GrabberConfig, runner: ProcessRunner) -> Self {
        Self {
            downloader_bin: cfg.downloader_bin.clone(),
            params: DownloadParams::from_config(cfg),
            work_dir: cfg.work_dir.clone(),
            isolate_jobs: cfg.isolate_jobs,
            timeout: cfg.timeout(),
            compressor: Compressor::from_config(cfg, runner.clone()),
            locator: ArtifactLocator::default(),
            runner,
        }
    }

    /// Download tool invocation writing into `dir`
    pub fn build_spec(&self, url: &str, dir: &Path) -> ProcessSpec {
        let output_template = dir.join(OUTPUT_TEMPLATE);

        let args = vec![
            "-f".to_string(),
            self.params.format_selector.clone(),
            "--merge-output-format".to_string(),
            MERGE_OUTPUT_FORMAT.to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().to_string(),
            // A URL must resolve to exactly one video
            "--no-playlist".to_string(),
            "--retries".to_string(),
            self.params.retries.to_string(),
            "--socket-timeout".to_string(),
            self.params.socket_timeout_secs.to_string(),
            "--extractor-retries".to_string(),
            self.params.extractor_retries.to_string(),
            "--no-check-certificates".to_string(),
            url.to_string(),
        ];

        ProcessSpec::new(self.downloader_bin.clone(), args, self.timeout)
    }

    /// Download `url`, compress the result and return the compressed file.
    ///
    /// Transient network errors are retried by the tool itself (`--retries`,
    /// `--extractor-retries`); nothing is retried here.
    pub async fn fetch(&self, url: &str) -> GrabResult<Artifact> {
        let job = JobWorkspace::create(&self.work_dir, self.isolate_jobs).await?;
        info!("Downloading video: {}", url);

        match self.download_and_compress(url, job.dir()).await {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                workspace::release_dir(job.dir()).await;
                Err(e)
            }
        }
    }

    async fn download_and_compress(&self, url: &str, dir: &Path) -> GrabResult<Artifact> {
        let spec = self.build_spec(url, dir);
        let program = spec.program_name();

        // Partial files of a killed download are left for the orphan sweep
        let outcome = self.runner.run(&spec).await?;
        if outcome.exit_code != 0 {
            error!(
                "{} failed for {} (exit code: {})\nOutput:\n{}",
                program, url, outcome.exit_code, outcome.combined_output
            );
            return Err(GrabError::process_failure(program, outcome.exit_code, outcome.combined_output));
        }

        let downloaded = self
            .locator
            .find(dir)
            .await?
            .ok_or_else(|| GrabError::ArtifactNotFound { dir: dir.to_path_buf() })?;
        info!(
            "Video downloaded successfully: {} ({})",
            downloaded.file_name(),
            downloaded.human_size()
        );

        let source_path = downloaded.path.clone();
        match self.compressor.compress(downloaded).await {
            Ok(compressed) => Ok(compressed),
            Err(e) => {
                warn!("Compression of {} failed, removing intermediate files", source_path.display());
                artifact::cleanup_path(&source_path).await;
                artifact::cleanup_path(&self.compressor.output_path_for(&source_path)).await;
                Err(e)
            }
        }
    }
}
