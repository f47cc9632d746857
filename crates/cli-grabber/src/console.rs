use std::path::{Path, PathBuf};
use async_trait::async_trait;
use grabber::{DeliveryError, MessagingClient};
use humansize::{format_size, BINARY};
use log::info;

/// Terminal stand-in for a chat transport.
///
/// Replies are printed to stdout and delivered videos are copied into
/// `delivery_dir`, since the pipeline deletes its own copy after sending.
pub struct ConsoleClient {
    delivery_dir: PathBuf,
}

impl ConsoleClient {
    pub fn new(delivery_dir: impl Into<PathBuf>) -> Self {
        Self {
            delivery_dir: delivery_dir.into(),
        }
    }
}

#[async_trait]
impl MessagingClient for ConsoleClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        println!("[chat {}] {}", chat_id, text);
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, video: &Path) -> Result<(), DeliveryError> {
        let video_err = |reason: String| DeliveryError::Video { chat_id, reason };

        let name = video
            .file_name()
            .ok_or_else(|| video_err(format!("not a file: {}", video.display())))?;
        tokio::fs::create_dir_all(&self.delivery_dir)
            .await
            .map_err(|e| video_err(format!("cannot create {}: {}", self.delivery_dir.display(), e)))?;

        let target = self.delivery_dir.join(name);
        let bytes = tokio::fs::copy(video, &target)
            .await
            .map_err(|e| video_err(format!("copy to {} failed: {}", target.display(), e)))?;

        info!("Delivered {} ({})", target.display(), format_size(bytes, BINARY));
        println!("[chat {}] 🎬 {}", chat_id, target.display());
        Ok(())
    }
}
