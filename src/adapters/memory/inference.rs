//! Rule-based stand-ins for the inference models.

use async_trait::async_trait;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{
    MaintenancePrediction, ProcessedReading, ReadingQuality, Urgency, ValidatedAnomaly,
};
use crate::domain::ports::{AnomalyModel, FailurePredictor};

/// Scores deviation from a nominal band of normalized values.
///
/// A reading at the band edge scores 0.5; one a full band width beyond the
/// centre scores 1.0. Suspect readings are scored slightly lower.
#[derive(Debug, Clone)]
pub struct ThresholdAnomalyModel {
    nominal_low: f64,
    nominal_high: f64,
}

impl Default for ThresholdAnomalyModel {
    fn default() -> Self {
        Self::new(0.2, 0.6)
    }
}

impl ThresholdAnomalyModel {
    pub fn new(nominal_low: f64, nominal_high: f64) -> Self {
        let (low, high) = if nominal_low <= nominal_high {
            (nominal_low, nominal_high)
        } else {
            (nominal_high, nominal_low)
        };
        Self {
            nominal_low: low,
            nominal_high: high,
        }
    }
}

#[async_trait]
impl AnomalyModel for ThresholdAnomalyModel {
    fn name(&self) -> &str {
        "threshold"
    }

    async fn score(&self, reading: &ProcessedReading) -> PortResult<f64> {
        if !reading.normalized_value.is_finite() {
            return Err(PortError::Inference("normalized value is not finite".to_string()));
        }
        let centre = (self.nominal_low + self.nominal_high) / 2.0;
        let width = (self.nominal_high - self.nominal_low).max(f64::EPSILON);
        let deviation = (reading.normalized_value - centre).abs() / width;
        let score = match reading.quality {
            ReadingQuality::Good => deviation,
            ReadingQuality::Suspect => deviation * 0.9,
        };
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Maps anomaly severity onto a linear wear curve.
#[derive(Debug, Clone)]
pub struct WearCurvePredictor {
    /// Time to failure when failure probability is zero.
    horizon_hours: f64,
}

impl Default for WearCurvePredictor {
    fn default() -> Self {
        Self::new(720.0)
    }
}

impl WearCurvePredictor {
    pub const fn new(horizon_hours: f64) -> Self {
        Self { horizon_hours }
    }

    fn urgency_for(probability: f64) -> Urgency {
        if probability >= 0.9 {
            Urgency::Critical
        } else if probability >= 0.75 {
            Urgency::High
        } else if probability >= 0.5 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

#[async_trait]
impl FailurePredictor for WearCurvePredictor {
    async fn predict(&self, validated: &ValidatedAnomaly) -> PortResult<MaintenancePrediction> {
        let probability = (validated.anomaly.score * 0.6 + validated.confidence * 0.4).clamp(0.0, 1.0);
        let urgency = Self::urgency_for(probability);
        let reading = &validated.anomaly.reading.reading;
        let recommended_action = match urgency {
            Urgency::Critical => format!("take {} offline and replace worn components", reading.equipment_id),
            Urgency::High => format!("inspect {} {} within the shift", reading.equipment_id, reading.metric),
            Urgency::Medium => format!("schedule {} inspection on {}", reading.metric, reading.equipment_id),
            Urgency::Low => format!("monitor {} on {}", reading.metric, reading.equipment_id),
        };

        Ok(MaintenancePrediction {
            anomaly_id: validated.anomaly.anomaly_id,
            equipment_id: reading.equipment_id.clone(),
            failure_probability: probability,
            time_to_failure_hours: (self.horizon_hours * (1.0 - probability)).max(1.0),
            recommended_action,
            urgency,
        })
    }
}
