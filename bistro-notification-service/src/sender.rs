use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::NotificationChannel;

#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("provider rejected message: {0}")]
    Rejected(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery capability (`send(phone, message) -> {success, message_id}`).
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn send(&self, recipient: &str, message: &str) -> Result<SendReceipt, SendError>;
}

/// Writes messages to the log instead of a provider.
#[derive(Default)]
pub struct LogOnlySender;

#[async_trait]
impl MessageSender for LogOnlySender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Log
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<SendReceipt, SendError> {
        let message_id = format!("log-{}", Uuid::new_v4());
        info!(%recipient, %message_id, %message, "message delivered to log");
        Ok(SendReceipt {
            message_id: Some(message_id),
        })
    }
}

/// Keeps every message in memory. Used by local runs and tests to read back
/// what would have been sent.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(vec![]),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_message_to(&self, recipient: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(to, _)| to == recipient)
            .map(|(_, message)| message)
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<SendReceipt, SendError> {
        if self.failing {
            return Err(SendError::Unavailable("recording sender set to fail".to_string()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| SendError::Unavailable("recording sender poisoned".to_string()))?;
        sent.push((recipient.to_string(), message.to_string()));
        Ok(SendReceipt {
            message_id: Some(format!("rec-{}", sent.len())),
        })
    }
}
