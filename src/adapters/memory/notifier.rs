//! Notifiers that log or record instead of delivering.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::PortResult;
use crate::domain::models::Notification;
use crate::domain::ports::Notifier;

/// Writes each notification to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: &Notification) -> PortResult<()> {
        tracing::info!(
            recipient = %notification.recipient,
            urgency = %notification.urgency,
            subject = %notification.subject,
            "notification sent"
        );
        Ok(())
    }
}

/// Keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> PortResult<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
