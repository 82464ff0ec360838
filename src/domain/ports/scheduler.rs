//! Scheduler port.

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{Assignment, MaintenanceTask};

/// Assigns maintenance work to a technician and a time slot.
///
/// A calendar or workforce-management integration implements this; the
/// scheduling stage only hands over the task and records the assignment.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn assign(&self, task: &MaintenanceTask) -> PortResult<Assignment>;
}
