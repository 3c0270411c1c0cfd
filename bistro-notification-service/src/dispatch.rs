use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{NotificationChannel, NotificationKind, NotificationRecord, NotificationStatus};
use crate::sender::MessageSender;
use crate::store::NotificationLog;

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Option<String>,
    pub body: String,
    pub reference_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub message_id: Option<String>,
}

/// Fire-and-forget delivery. Sending is bounded by `timeout`; failures are
/// logged and recorded but never returned to the caller.
pub struct Dispatcher {
    sender: Arc<dyn MessageSender>,
    log: Arc<dyn NotificationLog>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        log: Arc<dyn NotificationLog>,
        timeout: Duration,
    ) -> Self {
        Self {
            sender,
            log,
            timeout,
        }
    }

    #[instrument(skip_all, fields(kind = notification.kind.as_str(), reference_id = ?notification.reference_id))]
    pub async fn dispatch(&self, notification: Notification) -> DispatchOutcome {
        let (channel, status, message_id, failure) = match notification.recipient.as_deref() {
            None => {
                info!(body = %notification.body, "no recipient, notification logged only");
                (NotificationChannel::Log, NotificationStatus::Logged, None, None)
            }
            Some(recipient) => {
                let channel = self.sender.channel();
                match tokio::time::timeout(
                    self.timeout,
                    self.sender.send(recipient, &notification.body),
                )
                .await
                {
                    Ok(Ok(receipt)) => (channel, NotificationStatus::Sent, receipt.message_id, None),
                    Ok(Err(err)) => {
                        warn!(error = %err, "notification send failed");
                        (channel, NotificationStatus::Failed, None, Some(err.to_string()))
                    }
                    Err(_) => {
                        warn!(timeout_ms = self.timeout.as_millis() as u64, "notification send timed out");
                        let failure = format!("timed out after {}ms", self.timeout.as_millis());
                        (channel, NotificationStatus::Failed, None, Some(failure))
                    }
                }
            }
        };

        let record = NotificationRecord {
            id: Uuid::new_v4(),
            kind: notification.kind,
            channel,
            recipient: notification.recipient,
            body: notification.body,
            reference_id: notification.reference_id,
            status,
            provider_message_id: message_id.clone(),
            error: failure,
            created_at: Utc::now(),
        };
        if let Err(err) = self.log.append(&record).await {
            error!(error = %err, "cannot append notification record");
        }

        DispatchOutcome {
            success: status != NotificationStatus::Failed,
            message_id,
        }
    }
}
