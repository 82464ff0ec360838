//! Notification stage.

use async_trait::async_trait;
use std::sync::Arc;

use super::unexpected;
use crate::domain::errors::HandlerResult;
use crate::domain::models::{
    Capability, DecisionRequest, EventEnvelope, EventPayload, EventType, Notification,
    ScheduledMaintenance, Urgency,
};
use crate::domain::ports::Notifier;
use crate::services::{Stage, StageContext};

/// Tells technicians about assignments and operators about review requests.
pub struct NotificationStage {
    notifier: Arc<dyn Notifier>,
    operator_contact: String,
}

impl NotificationStage {
    pub fn new(notifier: Arc<dyn Notifier>, operator_contact: impl Into<String>) -> Self {
        Self {
            notifier,
            operator_contact: operator_contact.into(),
        }
    }

    fn assignment_notice(scheduled: &ScheduledMaintenance) -> Notification {
        Notification {
            recipient: scheduled.assignment.technician.clone(),
            subject: format!(
                "[{}] maintenance on {}",
                scheduled.task.urgency, scheduled.task.equipment_id
            ),
            body: format!(
                "{}\nScheduled for {}, due by {}.\nPredicted failure probability {:.0}%.",
                scheduled.task.action,
                scheduled.assignment.scheduled_for.format("%Y-%m-%d %H:%M UTC"),
                scheduled.task.due_by.format("%Y-%m-%d %H:%M UTC"),
                scheduled.prediction.failure_probability * 100.0
            ),
            urgency: scheduled.task.urgency,
        }
    }

    fn review_notice(&self, request: &DecisionRequest) -> Notification {
        Notification {
            recipient: self.operator_contact.clone(),
            subject: format!(
                "Review requested for {}",
                request.anomaly.reading.reading.equipment_id
            ),
            body: format!(
                "{}\nRequest {} (confidence {:.2}).",
                request.question, request.request_id, request.confidence
            ),
            urgency: Urgency::Medium,
        }
    }
}

#[async_trait]
impl Stage for NotificationStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::MaintenanceScheduled, EventType::HumanDecisionRequired]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::NOTIFICATION)]
    }

    async fn process(&self, event: &EventEnvelope, _ctx: &StageContext) -> HandlerResult {
        let notification = match event.payload() {
            EventPayload::MaintenanceScheduled(scheduled) => Self::assignment_notice(scheduled),
            EventPayload::HumanDecisionRequired(request) => self.review_notice(request),
            _ => {
                return Err(unexpected(
                    &[EventType::MaintenanceScheduled, EventType::HumanDecisionRequired],
                    event,
                ))
            }
        };
        self.notifier.send(&notification).await?;
        tracing::debug!(
            recipient = %notification.recipient,
            correlation_id = %event.correlation_id(),
            "notification delivered"
        );
        Ok(())
    }
}
