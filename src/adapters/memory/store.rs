//! In-memory maintenance store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{AnomalyReport, MaintenanceLogEntry, ProcessedReading};
use crate::domain::ports::MaintenanceStore;

/// Vec-backed store. Can be switched offline to exercise failure paths.
#[derive(Debug)]
pub struct InMemoryMaintenanceStore {
    readings: RwLock<Vec<ProcessedReading>>,
    anomalies: RwLock<Vec<AnomalyReport>>,
    log: RwLock<Vec<MaintenanceLogEntry>>,
    available: AtomicBool,
}

impl Default for InMemoryMaintenanceStore {
    fn default() -> Self {
        Self {
            readings: RwLock::default(),
            anomalies: RwLock::default(),
            log: RwLock::default(),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryMaintenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable every call fails with [`PortError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn readings(&self) -> Vec<ProcessedReading> {
        self.readings.read().await.clone()
    }

    pub async fn anomalies(&self) -> Vec<AnomalyReport> {
        self.anomalies.read().await.clone()
    }

    fn ensure_available(&self) -> PortResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PortError::Unavailable("maintenance store offline".to_string()))
        }
    }
}

#[async_trait]
impl MaintenanceStore for InMemoryMaintenanceStore {
    async fn save_reading(&self, reading: &ProcessedReading) -> PortResult<()> {
        self.ensure_available()?;
        self.readings.write().await.push(reading.clone());
        Ok(())
    }

    async fn save_anomaly(&self, anomaly: &AnomalyReport) -> PortResult<()> {
        self.ensure_available()?;
        let mut anomalies = self.anomalies.write().await;
        // Redelivery of the same anomaly must not count twice.
        if !anomalies.iter().any(|a| a.anomaly_id == anomaly.anomaly_id) {
            anomalies.push(anomaly.clone());
        }
        Ok(())
    }

    async fn anomalies_for_sensor(
        &self,
        sensor_id: &str,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<AnomalyReport>> {
        self.ensure_available()?;
        Ok(self
            .anomalies
            .read()
            .await
            .iter()
            .filter(|a| a.reading.reading.sensor_id == sensor_id && a.reading.reading.recorded_at >= since)
            .cloned()
            .collect())
    }

    async fn append_log(&self, entry: &MaintenanceLogEntry) -> PortResult<()> {
        self.ensure_available()?;
        let mut log = self.log.write().await;
        // Idempotent per (task, kind) so redelivered events do not duplicate.
        let duplicate = log.iter().any(|existing| {
            existing.task_id() == entry.task_id()
                && std::mem::discriminant(existing) == std::mem::discriminant(entry)
        });
        if !duplicate {
            log.push(entry.clone());
        }
        Ok(())
    }

    async fn maintenance_log(&self) -> PortResult<Vec<MaintenanceLogEntry>> {
        self.ensure_available()?;
        Ok(self.log.read().await.clone())
    }

    async fn health_check(&self) -> PortResult<()> {
        self.ensure_available()
    }
}
