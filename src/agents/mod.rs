//! Pipeline stages.
//!
//! Each stage consumes one step of the maintenance chain and emits the next:
//!
//! ```text
//! DataReceived -> acquisition -> DataProcessed -> anomaly_detection
//!   -> AnomalyDetected -> validation -> AnomalyValidated | HumanDecisionRequired
//!   -> prediction -> MaintenancePredicted -> scheduling -> MaintenanceScheduled
//!   -> notification, reporting
//! ```
//!
//! Stages receive their collaborators as port trait objects and never
//! construct them.

pub mod acquisition;
pub mod anomaly;
pub mod notification;
pub mod prediction;
pub mod reporting;
pub mod scheduling;
pub mod validation;

pub use acquisition::AcquisitionStage;
pub use anomaly::AnomalyDetectionStage;
pub use notification::NotificationStage;
pub use prediction::PredictionStage;
pub use reporting::ReportingStage;
pub use scheduling::SchedulingStage;
pub use validation::ValidationStage;

use crate::domain::errors::HandlerError;
use crate::domain::models::{EventEnvelope, EventType};

pub const ACQUISITION: &str = "acquisition";
pub const ANOMALY_DETECTION: &str = "anomaly_detection";
pub const VALIDATION: &str = "validation";
pub const PREDICTION: &str = "prediction";
pub const SCHEDULING: &str = "scheduling";
pub const NOTIFICATION: &str = "notification";
pub const REPORTING: &str = "reporting";

/// Fleet startup order: consumers before producers, so no stage can emit an
/// event whose consumer is not yet subscribed. Shutdown runs in reverse.
pub const STARTUP_ORDER: [&str; 7] = [
    REPORTING,
    NOTIFICATION,
    SCHEDULING,
    PREDICTION,
    VALIDATION,
    ANOMALY_DETECTION,
    ACQUISITION,
];

/// Error for an event whose kind the stage does not consume.
pub(crate) fn unexpected(expected: &[EventType], event: &EventEnvelope) -> HandlerError {
    let expected = expected
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    HandlerError::UnexpectedPayload {
        expected,
        actual: event.event_type().to_string(),
    }
}
