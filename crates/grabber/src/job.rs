use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One inbound download request. Lives for a single invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: String,
    pub chat_id: i64,
    pub source_url: String,
    pub received_at: DateTime<Utc>,
}

impl JobRequest {
    pub fn new(chat_id: i64, source_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            source_url: source_url.into(),
            received_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.received_at
    }
}

/// Which branch the handler took for an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Video sent, size in bytes
    Delivered { bytes: u64 },
    /// Video exceeded the upload limit and was discarded
    TooLarge { bytes: u64 },
    /// Pipeline or delivery failed; `reason` is for logs only
    Failed { reason: String },
    Greeted,
    Unrecognized,
    /// Update without text
    Ignored,
}

impl JobOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Format a duration as "1m 05s" / "42s"
pub fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
