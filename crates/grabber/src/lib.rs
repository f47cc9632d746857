pub mod config;
pub mod error;
pub mod process;
pub mod artifact;
pub mod scan;
pub mod workspace;
pub mod compressor;
pub mod downloader;
pub mod job;
pub mod replies;
pub mod handler;

pub use config::GrabberConfig;
pub use error::{GrabError, GrabResult};
pub use process::{ProcessOutcome, ProcessRunner, ProcessSpec};
pub use artifact::{cleanup, Artifact, CleanupStatus};
pub use scan::ArtifactLocator;
pub use workspace::SweepPolicy;
pub use compressor::Compressor;
pub use downloader::Downloader;
pub use job::{JobOutcome, JobRequest};
pub use handler::{ChatUpdate, DeliveryError, MessageHandler, MessagingClient};
