//! Acquisition stage: validates, normalizes and persists raw readings.

use async_trait::async_trait;
use std::sync::Arc;

use super::unexpected;
use crate::domain::errors::{HandlerError, HandlerResult};
use crate::domain::models::{
    Capability, EventEnvelope, EventPayload, EventType, PipelineConfig, ProcessedReading,
    ReadingQuality, SensorReading,
};
use crate::domain::ports::MaintenanceStore;
use crate::services::{Stage, StageContext};

/// Plausibility window for raw sensor values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityBounds {
    pub min: f64,
    pub max: f64,
    /// Fraction of the range at each edge treated as suspect.
    pub suspect_margin: f64,
}

impl PlausibilityBounds {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min: config.min_plausible_value,
            max: config.max_plausible_value,
            suspect_margin: config.suspect_margin,
        }
    }

    /// Normalize a reading into `[0, 1]`, or explain why it is rejected.
    pub fn assess(&self, reading: &SensorReading) -> Result<ProcessedReading, String> {
        let value = reading.value;
        if !value.is_finite() {
            return Err(format!("sensor {} reported a non-finite value", reading.sensor_id));
        }
        if value < self.min || value > self.max {
            return Err(format!(
                "sensor {} value {value} outside plausible range [{}, {}]",
                reading.sensor_id, self.min, self.max
            ));
        }
        let range = self.max - self.min;
        let normalized_value = if range > 0.0 { (value - self.min) / range } else { 0.5 };
        let quality = if normalized_value < self.suspect_margin || normalized_value > 1.0 - self.suspect_margin {
            ReadingQuality::Suspect
        } else {
            ReadingQuality::Good
        };
        Ok(ProcessedReading {
            reading: reading.clone(),
            normalized_value,
            quality,
        })
    }
}

pub struct AcquisitionStage {
    store: Arc<dyn MaintenanceStore>,
    bounds: PlausibilityBounds,
}

impl AcquisitionStage {
    pub fn new(store: Arc<dyn MaintenanceStore>, bounds: PlausibilityBounds) -> Self {
        Self { store, bounds }
    }
}

#[async_trait]
impl Stage for AcquisitionStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::DataReceived]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::SENSOR_INGESTION)]
    }

    async fn initialize(&self) -> Result<(), String> {
        self.store.health_check().await.map_err(|e| e.to_string())
    }

    async fn check_health(&self) -> Result<(), String> {
        self.store.health_check().await.map_err(|e| e.to_string())
    }

    async fn process(&self, event: &EventEnvelope, ctx: &StageContext) -> HandlerResult {
        let EventPayload::DataReceived(reading) = event.payload() else {
            return Err(unexpected(&[EventType::DataReceived], event));
        };

        let processed = self.bounds.assess(reading).map_err(HandlerError::Rejected)?;
        if processed.quality == ReadingQuality::Suspect {
            tracing::debug!(
                sensor_id = %reading.sensor_id,
                value = reading.value,
                correlation_id = %event.correlation_id(),
                "reading near plausibility edge"
            );
        }

        self.store.save_reading(&processed).await?;
        ctx.emit(event, EventPayload::DataProcessed(processed)).await?;
        Ok(())
    }
}
