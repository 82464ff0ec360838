//! Inference ports.
//!
//! Model training and the models themselves live outside this crate; stages
//! only ever see these two calls.

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{MaintenancePrediction, ProcessedReading, ValidatedAnomaly};

/// Scores how anomalous a processed reading is.
#[async_trait]
pub trait AnomalyModel: Send + Sync {
    /// Model name recorded on anomaly reports.
    fn name(&self) -> &str;

    /// Anomaly score in `[0, 1]`; higher is more anomalous.
    async fn score(&self, reading: &ProcessedReading) -> PortResult<f64>;

    /// Check that the model is loaded and reachable.
    async fn health_check(&self) -> PortResult<()> {
        Ok(())
    }
}

/// Predicts equipment failure from a validated anomaly.
#[async_trait]
pub trait FailurePredictor: Send + Sync {
    async fn predict(&self, anomaly: &ValidatedAnomaly) -> PortResult<MaintenancePrediction>;

    /// Check that the model is loaded and reachable.
    async fn health_check(&self) -> PortResult<()> {
        Ok(())
    }
}
