//! Maintenance store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::PortResult;
use crate::domain::models::{AnomalyReport, MaintenanceLogEntry, ProcessedReading};

/// Persistence for the domain records the stages read and write.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Persist an accepted reading.
    async fn save_reading(&self, reading: &ProcessedReading) -> PortResult<()>;

    /// Persist a detected anomaly.
    async fn save_anomaly(&self, anomaly: &AnomalyReport) -> PortResult<()>;

    /// Anomalies recorded for a sensor since the given time, oldest first.
    async fn anomalies_for_sensor(
        &self,
        sensor_id: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<AnomalyReport>>;

    /// Append to the maintenance log.
    async fn append_log(&self, entry: &MaintenanceLogEntry) -> PortResult<()>;

    /// The full maintenance log, oldest first.
    async fn maintenance_log(&self) -> PortResult<Vec<MaintenanceLogEntry>>;

    /// Check connectivity to the backing store.
    async fn health_check(&self) -> PortResult<()> {
        Ok(())
    }
}
