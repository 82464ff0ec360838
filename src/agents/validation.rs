//! Validation stage: filters false positives and escalates borderline cases
//! to an operator.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::unexpected;
use crate::domain::errors::HandlerResult;
use crate::domain::models::{
    AnomalyReport, Capability, DecisionRequest, EventEnvelope, EventPayload, EventType,
    PipelineConfig, ReadingQuality, ValidatedAnomaly,
};
use crate::domain::ports::MaintenanceStore;
use crate::services::{Stage, StageContext};

/// Recorded as `validated_by` when no operator was involved.
pub const AUTOMATIC_VALIDATOR: &str = "rules";

/// Confidence bands for validation decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationPolicy {
    /// At or above: validated automatically.
    pub auto_validate: f64,
    /// At or above (but below `auto_validate`): operator review.
    pub review_floor: f64,
    /// How far back corroborating anomalies are counted.
    pub corroboration_window: Duration,
}

impl ValidationPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            auto_validate: config.validation_confidence,
            review_floor: config.human_review_floor,
            corroboration_window: Duration::minutes(config.corroboration_window_minutes),
        }
    }
}

/// Combine score margin and corroboration into a confidence in `[0, 1]`.
///
/// A score exactly at threshold with no history yields 0.5, a score of 1.0
/// yields 0.85, and each corroborating anomaly adds 0.1, up to two.
pub fn confidence(anomaly: &AnomalyReport, supporting: usize) -> f64 {
    let headroom = 1.0 - anomaly.threshold;
    let margin = if headroom > 0.0 {
        ((anomaly.score - anomaly.threshold) / headroom).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let corroboration = 0.1 * supporting.min(2) as f64;
    let penalty = match anomaly.reading.quality {
        ReadingQuality::Good => 0.0,
        ReadingQuality::Suspect => 0.1,
    };
    (0.5 + 0.35 * margin + corroboration - penalty).clamp(0.0, 1.0)
}

pub struct ValidationStage {
    store: Arc<dyn MaintenanceStore>,
    policy: ValidationPolicy,
}

impl ValidationStage {
    pub fn new(store: Arc<dyn MaintenanceStore>, policy: ValidationPolicy) -> Self {
        Self { store, policy }
    }

    async fn validate(&self, event: &EventEnvelope, anomaly: &AnomalyReport, ctx: &StageContext) -> HandlerResult {
        let sensor_id = &anomaly.reading.reading.sensor_id;
        let since = anomaly.reading.reading.recorded_at - self.policy.corroboration_window;
        let supporting = self
            .store
            .anomalies_for_sensor(sensor_id, since)
            .await?
            .iter()
            .filter(|a| a.anomaly_id != anomaly.anomaly_id)
            .count();
        let confidence = confidence(anomaly, supporting);

        if confidence >= self.policy.auto_validate {
            tracing::info!(
                anomaly_id = %anomaly.anomaly_id,
                confidence,
                supporting,
                correlation_id = %event.correlation_id(),
                "anomaly validated"
            );
            let validated = ValidatedAnomaly {
                anomaly: anomaly.clone(),
                confidence,
                supporting_anomalies: supporting,
                validated_by: AUTOMATIC_VALIDATOR.to_string(),
            };
            ctx.emit(event, EventPayload::AnomalyValidated(validated)).await?;
        } else if confidence >= self.policy.review_floor {
            tracing::info!(
                anomaly_id = %anomaly.anomaly_id,
                confidence,
                correlation_id = %event.correlation_id(),
                "anomaly needs operator review"
            );
            let request = DecisionRequest {
                request_id: Uuid::new_v4(),
                anomaly: anomaly.clone(),
                confidence,
                question: format!(
                    "Confirm anomaly on {} ({} = {} {}, score {:.2})?",
                    anomaly.reading.reading.equipment_id,
                    anomaly.reading.reading.metric,
                    anomaly.reading.reading.value,
                    anomaly.reading.reading.unit,
                    anomaly.score
                ),
            };
            ctx.emit(event, EventPayload::HumanDecisionRequired(request)).await?;
        } else {
            tracing::info!(
                anomaly_id = %anomaly.anomaly_id,
                confidence,
                correlation_id = %event.correlation_id(),
                "anomaly discarded as false positive"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::AnomalyDetected, EventType::HumanDecisionResponse]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new(Capability::ANOMALY_VALIDATION),
            Capability::new(Capability::HUMAN_REVIEW),
        ]
    }

    async fn check_health(&self) -> Result<(), String> {
        self.store.health_check().await.map_err(|e| e.to_string())
    }

    async fn process(&self, event: &EventEnvelope, ctx: &StageContext) -> HandlerResult {
        match event.payload() {
            EventPayload::AnomalyDetected(anomaly) => self.validate(event, anomaly, ctx).await,
            EventPayload::HumanDecisionResponse(response) if response.approved => {
                tracing::info!(
                    request_id = %response.request_id,
                    operator = %response.operator,
                    correlation_id = %event.correlation_id(),
                    "operator confirmed anomaly"
                );
                let validated = ValidatedAnomaly {
                    anomaly: response.anomaly.clone(),
                    confidence: 1.0,
                    supporting_anomalies: 0,
                    validated_by: response.operator.clone(),
                };
                ctx.emit(event, EventPayload::AnomalyValidated(validated)).await?;
                Ok(())
            }
            EventPayload::HumanDecisionResponse(response) => {
                tracing::info!(
                    request_id = %response.request_id,
                    operator = %response.operator,
                    correlation_id = %event.correlation_id(),
                    "operator rejected anomaly"
                );
                Ok(())
            }
            _ => Err(unexpected(
                &[EventType::AnomalyDetected, EventType::HumanDecisionResponse],
                event,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryMaintenanceStore;
    use crate::agents::testing;
    use crate::domain::models::DecisionResponse;
    use std::time::Duration as StdDuration;

    fn policy() -> ValidationPolicy {
        ValidationPolicy::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_confidence_bands() {
        assert!((confidence(&testing::anomaly(0.7), 0) - 0.5).abs() < 1e-9);
        assert!((confidence(&testing::anomaly(1.0), 0) - 0.85).abs() < 1e-9);
        assert!((confidence(&testing::anomaly(0.7), 5) - 0.7).abs() < 1e-9);
    }

    async fn run(anomaly: AnomalyReport, store: Arc<InMemoryMaintenanceStore>) -> (Vec<EventEnvelope>, Vec<EventEnvelope>) {
        let bus = testing::bus();
        let validated = testing::capture(&bus, EventType::AnomalyValidated).await;
        let review = testing::capture(&bus, EventType::HumanDecisionRequired).await;
        let stage = ValidationStage::new(store, policy());

        let cause = testing::event(EventPayload::AnomalyDetected(anomaly));
        stage.process(&cause, &testing::context("validation", &bus)).await.unwrap();
        bus.wait_idle(StdDuration::from_secs(1)).await;

        let validated = validated.lock().await.clone();
        let review = review.lock().await.clone();
        (validated, review)
    }

    #[tokio::test]
    async fn test_strong_anomaly_validated_automatically() {
        let (validated, review) = run(testing::anomaly(1.0), Arc::new(InMemoryMaintenanceStore::new())).await;
        assert_eq!(validated.len(), 1);
        assert!(review.is_empty());
        let EventPayload::AnomalyValidated(v) = validated[0].payload() else {
            panic!("expected validated anomaly");
        };
        assert_eq!(v.validated_by, AUTOMATIC_VALIDATOR);
    }

    #[tokio::test]
    async fn test_borderline_anomaly_goes_to_operator() {
        let (validated, review) = run(testing::anomaly(0.75), Arc::new(InMemoryMaintenanceStore::new())).await;
        assert!(validated.is_empty());
        assert_eq!(review.len(), 1);
    }

    #[tokio::test]
    async fn test_corroboration_lifts_confidence() {
        let store = Arc::new(InMemoryMaintenanceStore::new());
        for _ in 0..2 {
            store.save_anomaly(&testing::anomaly(0.9)).await.unwrap();
        }
        let (validated, review) = run(testing::anomaly(0.85), store).await;
        assert_eq!(validated.len(), 1);
        assert!(review.is_empty());
    }

    #[tokio::test]
    async fn test_weak_suspect_anomaly_discarded() {
        let mut anomaly = testing::anomaly(0.7);
        anomaly.reading.quality = ReadingQuality::Suspect;
        let (validated, review) = run(anomaly, Arc::new(InMemoryMaintenanceStore::new())).await;
        assert!(validated.is_empty());
        assert!(review.is_empty());
    }

    #[tokio::test]
    async fn test_operator_approval_validates() {
        let bus = testing::bus();
        let validated = testing::capture(&bus, EventType::AnomalyValidated).await;
        let stage = ValidationStage::new(Arc::new(InMemoryMaintenanceStore::new()), policy());
        let ctx = testing::context("validation", &bus);

        let response = |approved: bool| DecisionResponse {
            request_id: Uuid::new_v4(),
            anomaly: testing::anomaly(0.75),
            approved,
            operator: "ines".to_string(),
            comment: None,
        };
        stage
            .process(&testing::event(EventPayload::HumanDecisionResponse(response(false))), &ctx)
            .await
            .unwrap();
        stage
            .process(&testing::event(EventPayload::HumanDecisionResponse(response(true))), &ctx)
            .await
            .unwrap();
        bus.wait_idle(StdDuration::from_secs(1)).await;

        let validated = validated.lock().await;
        assert_eq!(validated.len(), 1);
        let EventPayload::AnomalyValidated(v) = validated[0].payload() else {
            panic!("expected validated anomaly");
        };
        assert_eq!(v.validated_by, "ines");
    }
}
