//! Port trait definitions (Hexagonal Architecture)
//!
//! Opaque collaborators the pipeline stages call into:
//! - MaintenanceStore: persistence of readings, anomalies and the maintenance log
//! - AnomalyModel: anomaly scoring inference
//! - FailurePredictor: failure prediction inference
//! - Scheduler: technician assignment
//! - Notifier: outbound notification delivery
//!
//! The orchestration core depends only on these signatures. Implementations
//! are injected by the coordinator and never constructed by a stage.

pub mod inference;
pub mod maintenance_store;
pub mod notifier;
pub mod scheduler;

pub use inference::{AnomalyModel, FailurePredictor};
pub use maintenance_store::MaintenanceStore;
pub use notifier::Notifier;
pub use scheduler::Scheduler;
