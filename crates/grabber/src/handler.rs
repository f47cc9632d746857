//! Dispatch of inbound chat messages to the download pipeline.

use std::path::Path;
use std::sync::OnceLock;
use async_trait::async_trait;
use log::{error, info, warn};
use regex::Regex;
use thiserror::Error;
use crate::artifact;
use crate::downloader::Downloader;
use crate::error::GrabError;
use crate::job::{format_duration, JobOutcome, JobRequest};
use crate::replies;

/// Command that triggers the greeting
pub const START_COMMAND: &str = "/start";

/// Failure of the outbound messaging client
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to send message to chat {chat_id}: {reason}")]
    Text { chat_id: i64, reason: String },

    #[error("Failed to send video to chat {chat_id}: {reason}")]
    Video { chat_id: i64, reason: String },
}

/// Outbound side of the chat transport. Each call is a single send.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;

    async fn send_video(&self, chat_id: i64, video: &Path) -> Result<(), DeliveryError>;
}

/// An inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpdate {
    pub chat_id: i64,
    pub text: Option<String>,
}

impl ChatUpdate {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: Some(text.into()),
        }
    }
}

/// Whether `text` is a YouTube video link
pub fn is_youtube_url(text: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.?be)/.+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Size gate: true when `size_bytes` may be delivered under `limit`
pub fn within_upload_limit(size_bytes: u64, limit: u64) -> bool {
    size_bytes <= limit
}

/// Routes updates: greeting, download pipeline or "unrecognized"
pub struct MessageHandler<C> {
    downloader: Downloader,
    client: C,
    max_upload_bytes: u64,
}

impl<C: MessagingClient> MessageHandler<C> {
    pub fn new(downloader: Downloader, client: C, max_upload_bytes: u64) -> Self {
        Self {
            downloader,
            client,
            max_upload_bytes,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn handle(&self, update: &ChatUpdate) -> JobOutcome {
        let Some(text) = update.text.as_deref() else {
            return JobOutcome::Ignored;
        };
        // Exact match: surrounding whitespace makes a message unrecognized
        if text == START_COMMAND {
            self.reply(update.chat_id, replies::GREETING).await;
            JobOutcome::Greeted
        } else if is_youtube_url(text) {
            self.process(JobRequest::new(update.chat_id, text)).await
        } else {
            self.reply(update.chat_id, replies::UNRECOGNIZED).await;
            JobOutcome::Unrecognized
        }
    }

    /// Run the pipeline for one request and deliver or discard the result
    pub async fn process(&self, job: JobRequest) -> JobOutcome {
        info!("Job {} started for chat {}: {}", job.id, job.chat_id, job.source_url);
        self.reply(job.chat_id, replies::downloading_quote()).await;

        let artifact = match self.downloader.fetch(&job.source_url).await {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(&job, &e).await,
        };

        let bytes = artifact.size_bytes;
        if !within_upload_limit(bytes, self.max_upload_bytes) {
            warn!(
                "Job {}: {} is {} bytes, over the {} byte limit",
                job.id,
                artifact.file_name(),
                bytes,
                self.max_upload_bytes
            );
            self.reply(job.chat_id, replies::TOO_LARGE).await;
            artifact::cleanup(artifact).await;
            return JobOutcome::TooLarge { bytes };
        }

        let delivery = self.client.send_video(job.chat_id, &artifact.path).await;
        artifact::cleanup(artifact).await;

        match delivery {
            Ok(()) => {
                info!(
                    "Job {}: video sent to chat {} in {}",
                    job.id,
                    job.chat_id,
                    format_duration(job.elapsed())
                );
                JobOutcome::Delivered { bytes }
            }
            Err(e) => {
                error!("Job {}: {}", job.id, e);
                self.reply(job.chat_id, replies::error_quote()).await;
                JobOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    async fn fail(&self, job: &JobRequest, e: &GrabError) -> JobOutcome {
        match e {
            GrabError::Timeout { .. } => error!("Download timeout for chat {} (job {}): {}", job.chat_id, job.id, e),
            _ => error!("Failed to download video for chat {} (job {}): {}", job.chat_id, job.id, e),
        }
        self.reply(job.chat_id, replies::error_quote()).await;
        JobOutcome::Failed { reason: e.to_string() }
    }

    /// Send a text reply; a failed send is logged and does not abort the job
    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.client.send_text(chat_id, text).await {
            warn!("{}", e);
        }
    }
}
