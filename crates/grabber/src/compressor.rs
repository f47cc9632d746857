use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{debug, error, info};
use crate::artifact::Artifact;
use crate::config::GrabberConfig;
use crate::error::{GrabError, GrabResult};
use crate::process::{ProcessRunner, ProcessSpec};
use crate::scan::COMPRESSED_PREFIX;

/// x264/AAC encoding parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionParams {
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl CompressionParams {
    pub fn from_config(cfg: &GrabberConfig) -> Self {
        Self {
            crf: cfg.crf,
            preset: cfg.preset.clone(),
            audio_bitrate: cfg.audio_bitrate.clone(),
        }
    }
}

/// Re-encodes a downloaded file so it fits the delivery size limit
#[derive(Debug, Clone)]
pub struct Compressor {
    ffmpeg_bin: PathBuf,
    params: CompressionParams,
    timeout: Duration,
    runner: ProcessRunner,
}

impl Compressor {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, params: CompressionParams, timeout: Duration, runner: ProcessRunner) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            params,
            timeout,
            runner,
        }
    }

    pub fn from_config(cfg: &GrabberConfig, runner: ProcessRunner) -> Self {
        Self::new(cfg.ffmpeg_bin.clone(), CompressionParams::from_config(cfg), cfg.timeout(), runner)
    }

    /// `<dir>/compressed_<name>` next to the source
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        dir.join(format!("{}{}", COMPRESSED_PREFIX, name))
    }

    /// Transcoder invocation for `input` -> `output`
    pub fn build_spec(&self, input: &Path, output: &Path) -> ProcessSpec {
        let mut args = Vec::new();

        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());

        // Video: H.264 constant quality
        args.push("-c:v".to_string());
        args.push("libx264".to_string());
        args.push("-crf".to_string());
        args.push(self.params.crf.to_string());
        args.push("-preset".to_string());
        args.push(self.params.preset.clone());

        // Audio: AAC at fixed bitrate
        args.push("-c:a".to_string());
        args.push("aac".to_string());
        args.push("-b:a".to_string());
        args.push(self.params.audio_bitrate.clone());

        // Move the moov atom up front so playback starts before the upload completes
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());

        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());

        ProcessSpec::new(self.ffmpeg_bin.clone(), args, self.timeout)
    }

    /// Transcode `source` and delete it.
    ///
    /// On success the source file is gone and only the returned artifact
    /// remains. On failure both files are left as the transcoder left them;
    /// removing them is the caller's job.
    pub async fn compress(&self, source: Artifact) -> GrabResult<Artifact> {
        info!("Compressing video: {} ({})", source.file_name(), source.human_size());

        let output_path = self.output_path_for(&source.path);
        let spec = self.build_spec(&source.path, &output_path);
        let program = spec.program_name();

        let outcome = self.runner.run(&spec).await?;
        if outcome.exit_code != 0 {
            error!(
                "{} failed to compress {} (exit code: {})\nOutput:\n{}",
                program,
                source.file_name(),
                outcome.exit_code,
                outcome.combined_output
            );
            return Err(GrabError::process_failure(program, outcome.exit_code, outcome.combined_output));
        }

        let compressed = Artifact::from_path(&output_path).await?;

        tokio::fs::remove_file(&source.path)
            .await
            .map_err(|e| GrabError::io(format!("Failed to delete original {}", source.path.display()), e))?;
        debug!("Deleted original: {}", source.path.display());

        info!(
            "Video compressed: {} ({} -> {})",
            compressed.file_name(),
            source.human_size(),
            compressed.human_size()
        );
        Ok(compressed)
    }
}
