//! Payload types carried by pipeline events.
//!
//! These shapes are relied on by every stage downstream of the one that
//! produces them. Fields may be added with `#[serde(default)]`; existing
//! fields must not change meaning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A raw reading as accepted at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub equipment_id: String,
    /// Measured quantity, e.g. "temperature" or "vibration".
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(
        sensor_id: impl Into<String>,
        equipment_id: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            equipment_id: equipment_id.into(),
            metric: metric.into(),
            value,
            unit: unit.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Signal quality assigned during acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingQuality {
    Good,
    /// Inside plausibility bounds but close to an edge.
    Suspect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedReading {
    pub reading: SensorReading,
    /// Value scaled into `[0, 1]` against the configured plausibility bounds.
    pub normalized_value: f64,
    pub quality: ReadingQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomaly_id: Uuid,
    pub reading: ProcessedReading,
    pub score: f64,
    pub threshold: f64,
    /// Name of the model that produced the score.
    pub detector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedAnomaly {
    pub anomaly: AnomalyReport,
    pub confidence: f64,
    /// Earlier anomalies on the same sensor that corroborate this one.
    pub supporting_anomalies: usize,
    /// `"rules"` for automatic validation, or the operator name.
    pub validated_by: String,
}

/// How soon maintenance should happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePrediction {
    pub anomaly_id: Uuid,
    pub equipment_id: String,
    pub failure_probability: f64,
    pub time_to_failure_hours: f64,
    pub recommended_action: String,
    pub urgency: Urgency,
}

/// Work order handed to the scheduling collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTask {
    pub task_id: Uuid,
    pub equipment_id: String,
    pub action: String,
    pub urgency: Urgency,
    /// Latest time the work should start.
    pub due_by: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub technician: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMaintenance {
    pub task: MaintenanceTask,
    pub prediction: MaintenancePrediction,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedMaintenance {
    pub task_id: Uuid,
    pub equipment_id: String,
    pub technician: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Question put to an operator when automatic validation is inconclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub request_id: Uuid,
    pub anomaly: AnomalyReport,
    pub confidence: f64,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub request_id: Uuid,
    /// Echoed back from the request so the response is self-contained.
    pub anomaly: AnomalyReport,
    pub approved: bool,
    pub operator: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Message delivered by the notification stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub urgency: Urgency,
}

/// Entry in the maintenance log kept by the reporting stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaintenanceLogEntry {
    Scheduled(ScheduledMaintenance),
    Completed(CompletedMaintenance),
}

impl MaintenanceLogEntry {
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::Scheduled(s) => s.task.task_id,
            Self::Completed(c) => c.task_id,
        }
    }
}
