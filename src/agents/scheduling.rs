//! Scheduling stage.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::unexpected;
use crate::domain::errors::{HandlerError, HandlerResult};
use crate::domain::models::{
    Capability, EventEnvelope, EventPayload, EventType, MaintenancePrediction, MaintenanceTask,
    ScheduledMaintenance,
};
use crate::domain::ports::Scheduler;
use crate::services::{Stage, StageContext};

/// Work is due halfway to the predicted failure.
fn task_for(prediction: &MaintenancePrediction) -> Result<MaintenanceTask, HandlerError> {
    let hours = prediction.time_to_failure_hours;
    if !hours.is_finite() {
        return Err(HandlerError::Rejected(format!(
            "time to failure is not finite: {hours}"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let minutes = (hours.max(0.0) * 30.0).round() as i64;
    let due_by = Duration::try_minutes(minutes)
        .and_then(|offset| Utc::now().checked_add_signed(offset))
        .ok_or_else(|| {
            HandlerError::Rejected(format!("time to failure out of range: {hours}h"))
        })?;
    Ok(MaintenanceTask {
        task_id: Uuid::new_v4(),
        equipment_id: prediction.equipment_id.clone(),
        action: prediction.recommended_action.clone(),
        urgency: prediction.urgency,
        due_by,
    })
}

/// Creates maintenance tasks and obtains technician assignments.
pub struct SchedulingStage {
    scheduler: Arc<dyn Scheduler>,
}

impl SchedulingStage {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Stage for SchedulingStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::MaintenancePredicted]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::MAINTENANCE_SCHEDULING)]
    }

    async fn process(&self, event: &EventEnvelope, ctx: &StageContext) -> HandlerResult {
        let EventPayload::MaintenancePredicted(prediction) = event.payload() else {
            return Err(unexpected(&[EventType::MaintenancePredicted], event));
        };

        let task = task_for(prediction)?;
        let assignment = self.scheduler.assign(&task).await?;
        tracing::info!(
            task_id = %task.task_id,
            equipment_id = %task.equipment_id,
            technician = %assignment.technician,
            scheduled_for = %assignment.scheduled_for,
            correlation_id = %event.correlation_id(),
            "maintenance scheduled"
        );

        let scheduled = ScheduledMaintenance {
            task,
            prediction: prediction.clone(),
            assignment,
        };
        ctx.emit(event, EventPayload::MaintenanceScheduled(scheduled)).await?;
        Ok(())
    }
}
