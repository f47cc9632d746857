use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::error::GrabError;
use crate::process::DEFAULT_DRAIN_GRACE;

/// Delivery ceiling of the chat platform (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Format selectors tried in order by the downloader
pub const DEFAULT_FORMAT_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Configuration for the media acquisition pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GrabberConfig {
    /// Scratch directory for in-flight downloads and transcodes
    pub work_dir: PathBuf,
    /// Downloader executable (name on PATH or absolute path)
    pub downloader_bin: PathBuf,
    /// Transcoder executable
    pub ffmpeg_bin: PathBuf,
    /// Wall-clock limit for each subprocess
    pub timeout_secs: u64,
    /// Downloader `--retries`
    pub retries: u32,
    /// Downloader `--socket-timeout`
    pub socket_timeout_secs: u64,
    /// Downloader `--extractor-retries`
    pub extractor_retries: u32,
    /// Downloader `-f` selector chain
    pub format_selector: String,
    /// x264 constant rate factor (0-51, lower = better quality, larger file)
    pub crf: u8,
    /// x264 speed/quality preset
    pub preset: String,
    /// AAC bitrate passed to `-b:a`
    pub audio_bitrate: String,
    /// Size gate applied before delivery
    pub max_upload_bytes: u64,
    /// Give every job its own subdirectory of `work_dir`
    pub isolate_jobs: bool,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl GrabberConfig {
    /// Create a default configuration matching the reference deployment
    pub fn default_config() -> Self {
        Self {
            work_dir: PathBuf::from("./temp"),
            downloader_bin: PathBuf::from("yt-dlp"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            timeout_secs: 30,
            retries: 2,
            socket_timeout_secs: 30,
            extractor_retries: 2,
            format_selector: DEFAULT_FORMAT_SELECTOR.to_string(),
            crf: 28,
            preset: "veryfast".to_string(),
            audio_bitrate: "128k".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            isolate_jobs: true,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                config = if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?
                } else {
                    serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?
                };
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every job fail
    pub fn validate(&self) -> Result<(), GrabError> {
        if self.timeout_secs == 0 {
            return Err(GrabError::Config("timeout_secs must be greater than zero".to_string()));
        }
        if self.downloader_bin.as_os_str().is_empty() {
            return Err(GrabError::Config("downloader_bin must not be empty".to_string()));
        }
        if self.ffmpeg_bin.as_os_str().is_empty() {
            return Err(GrabError::Config("ffmpeg_bin must not be empty".to_string()));
        }
        if self.crf > 51 {
            return Err(GrabError::Config(format!("crf must be within 0..=51, got {}", self.crf)));
        }
        if self.format_selector.trim().is_empty() {
            return Err(GrabError::Config("format_selector must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound on the lifetime of one job: a download and a transcode,
    /// each with its kill and drain grace. Scratch entries older than this
    /// cannot belong to a running job.
    pub fn orphan_age(&self) -> Duration {
        (self.timeout() + 2 * DEFAULT_DRAIN_GRACE) * 2
    }
}
