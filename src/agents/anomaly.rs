//! Anomaly detection stage.

use async_trait::async_trait;
use std::sync::Arc;

use super::unexpected;
use crate::domain::errors::HandlerResult;
use crate::domain::models::{AnomalyReport, Capability, EventEnvelope, EventPayload, EventType};
use crate::domain::ports::{AnomalyModel, MaintenanceStore};
use crate::services::{Stage, StageContext};

/// Scores processed readings and reports those at or above the threshold.
pub struct AnomalyDetectionStage {
    model: Arc<dyn AnomalyModel>,
    store: Arc<dyn MaintenanceStore>,
    threshold: f64,
}

impl AnomalyDetectionStage {
    pub fn new(model: Arc<dyn AnomalyModel>, store: Arc<dyn MaintenanceStore>, threshold: f64) -> Self {
        Self { model, store, threshold }
    }
}

#[async_trait]
impl Stage for AnomalyDetectionStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::DataProcessed]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::ANOMALY_DETECTION)]
    }

    async fn initialize(&self) -> Result<(), String> {
        self.model.health_check().await.map_err(|e| e.to_string())
    }

    async fn check_health(&self) -> Result<(), String> {
        self.model.health_check().await.map_err(|e| e.to_string())?;
        self.store.health_check().await.map_err(|e| e.to_string())
    }

    async fn process(&self, event: &EventEnvelope, ctx: &StageContext) -> HandlerResult {
        let EventPayload::DataProcessed(reading) = event.payload() else {
            return Err(unexpected(&[EventType::DataProcessed], event));
        };

        let score = self.model.score(reading).await?;
        if score < self.threshold {
            tracing::trace!(
                sensor_id = %reading.reading.sensor_id,
                score,
                correlation_id = %event.correlation_id(),
                "reading within normal range"
            );
            return Ok(());
        }

        // Keyed by the cause so a redelivered reading saves the same anomaly.
        let report = AnomalyReport {
            anomaly_id: event.event_id().0,
            reading: reading.clone(),
            score,
            threshold: self.threshold,
            detector: self.model.name().to_string(),
        };
        tracing::info!(
            anomaly_id = %report.anomaly_id,
            sensor_id = %reading.reading.sensor_id,
            equipment_id = %reading.reading.equipment_id,
            score,
            correlation_id = %event.correlation_id(),
            "anomaly detected"
        );

        self.store.save_anomaly(&report).await?;
        ctx.emit(event, EventPayload::AnomalyDetected(report)).await?;
        Ok(())
    }
}
