//! Reporting stage: keeps the maintenance log.

use async_trait::async_trait;
use std::sync::Arc;

use super::unexpected;
use crate::domain::errors::HandlerResult;
use crate::domain::models::{Capability, EventEnvelope, EventPayload, EventType, MaintenanceLogEntry};
use crate::domain::ports::MaintenanceStore;
use crate::services::{Stage, StageContext};

pub struct ReportingStage {
    store: Arc<dyn MaintenanceStore>,
}

impl ReportingStage {
    pub fn new(store: Arc<dyn MaintenanceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for ReportingStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::MaintenanceScheduled, EventType::MaintenanceCompleted]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::MAINTENANCE_LOGGING)]
    }

    async fn initialize(&self) -> Result<(), String> {
        self.store.health_check().await.map_err(|e| e.to_string())
    }

    async fn check_health(&self) -> Result<(), String> {
        self.store.health_check().await.map_err(|e| e.to_string())
    }

    async fn process(&self, event: &EventEnvelope, _ctx: &StageContext) -> HandlerResult {
        let entry = match event.payload() {
            EventPayload::MaintenanceScheduled(scheduled) => MaintenanceLogEntry::Scheduled(scheduled.clone()),
            EventPayload::MaintenanceCompleted(completed) => MaintenanceLogEntry::Completed(completed.clone()),
            _ => {
                return Err(unexpected(
                    &[EventType::MaintenanceScheduled, EventType::MaintenanceCompleted],
                    event,
                ))
            }
        };
        self.store.append_log(&entry).await?;
        tracing::info!(
            task_id = %entry.task_id(),
            correlation_id = %event.correlation_id(),
            "maintenance log updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryMaintenanceStore;
    use crate::agents::testing;
    use crate::domain::models::CompletedMaintenance;
    use chrono::Utc;

    #[tokio::test]
    async fn test_completion_is_logged() {
        let bus = testing::bus();
        let store = Arc::new(InMemoryMaintenanceStore::new());
        let stage = ReportingStage::new(store.clone());

        let completed = CompletedMaintenance {
            task_id: uuid::Uuid::new_v4(),
            equipment_id: "pump-1".to_string(),
            technician: "ana".to_string(),
            notes: Some("replaced seal".to_string()),
            completed_at: Utc::now(),
        };
        let cause = testing::event(EventPayload::MaintenanceCompleted(completed.clone()));
        stage.process(&cause, &testing::context("reporting", &bus)).await.unwrap();

        let log = store.maintenance_log().await.unwrap();
        assert_eq!(log, vec![MaintenanceLogEntry::Completed(completed)]);
    }
}
