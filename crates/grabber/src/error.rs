use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations
pub type GrabResult<T> = Result<T, GrabError>;

/// Failures of the media acquisition pipeline.
///
/// None of these are retried inside the pipeline. Retries of transient
/// network failures are delegated to the downloader's own flags.
#[derive(Debug, Error)]
pub enum GrabError {
    /// The executable could not be started (missing, not executable, ...)
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The subprocess was still running when its deadline elapsed and was killed
    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    /// The subprocess exited with a non-zero code.
    /// `output` is diagnostic only and must never reach the end user.
    #[error("{program} exited with code {exit_code}")]
    ProcessFailure {
        program: String,
        exit_code: i32,
        output: String,
    },

    /// Post-download scan found no media file
    #[error("Downloaded file not found in {}", .dir.display())]
    ArtifactNotFound { dir: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GrabError {
    pub fn launch(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    pub fn timeout(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            program: program.into(),
            timeout_secs,
        }
    }

    pub fn process_failure(program: impl Into<String>, exit_code: i32, output: impl Into<String>) -> Self {
        Self::ProcessFailure {
            program: program.into(),
            exit_code,
            output: output.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_artifact_not_found(&self) -> bool {
        matches!(self, Self::ArtifactNotFound { .. })
    }
}
