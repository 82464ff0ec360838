//! Notifier port.

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::Notification;

/// Delivers a notification; rendering and transport are the implementor's
/// concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> PortResult<()>;
}
