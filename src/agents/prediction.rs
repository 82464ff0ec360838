//! Prediction stage.

use async_trait::async_trait;
use std::sync::Arc;

use super::unexpected;
use crate::domain::errors::HandlerResult;
use crate::domain::models::{Capability, EventEnvelope, EventPayload, EventType};
use crate::domain::ports::FailurePredictor;
use crate::services::{Stage, StageContext};

/// Turns validated anomalies into failure predictions.
pub struct PredictionStage {
    predictor: Arc<dyn FailurePredictor>,
}

impl PredictionStage {
    pub fn new(predictor: Arc<dyn FailurePredictor>) -> Self {
        Self { predictor }
    }
}

#[async_trait]
impl Stage for PredictionStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::AnomalyValidated]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::FAILURE_PREDICTION)]
    }

    async fn initialize(&self) -> Result<(), String> {
        self.predictor.health_check().await.map_err(|e| e.to_string())
    }

    async fn check_health(&self) -> Result<(), String> {
        self.predictor.health_check().await.map_err(|e| e.to_string())
    }

    async fn process(&self, event: &EventEnvelope, ctx: &StageContext) -> HandlerResult {
        let EventPayload::AnomalyValidated(validated) = event.payload() else {
            return Err(unexpected(&[EventType::AnomalyValidated], event));
        };

        let prediction = self.predictor.predict(validated).await?;
        tracing::info!(
            equipment_id = %prediction.equipment_id,
            failure_probability = prediction.failure_probability,
            urgency = %prediction.urgency,
            correlation_id = %event.correlation_id(),
            "maintenance predicted"
        );
        ctx.emit(event, EventPayload::MaintenancePredicted(prediction)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::WearCurvePredictor;
    use crate::agents::testing;
    use crate::domain::models::ValidatedAnomaly;
    use std::time::Duration;

    #[tokio::test]
    async fn test_prediction_refers_to_anomaly() {
        let bus = testing::bus();
        let out = testing::capture(&bus, EventType::MaintenancePredicted).await;
        let stage = PredictionStage::new(Arc::new(WearCurvePredictor::default()));

        let anomaly = testing::anomaly(0.95);
        let anomaly_id = anomaly.anomaly_id;
        let cause = testing::event(EventPayload::AnomalyValidated(ValidatedAnomaly {
            anomaly,
            confidence: 0.9,
            supporting_anomalies: 1,
            validated_by: "rules".to_string(),
        }));
        stage.process(&cause, &testing::context("prediction", &bus)).await.unwrap();
        bus.wait_idle(Duration::from_secs(1)).await;

        let out = out.lock().await;
        assert_eq!(out.len(), 1);
        let EventPayload::MaintenancePredicted(prediction) = out[0].payload() else {
            panic!("expected prediction");
        };
        assert_eq!(prediction.anomaly_id, anomaly_id);
        assert_eq!(prediction.equipment_id, "pump-1");
    }
}
