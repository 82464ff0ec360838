//! In-process implementations of the collaborator ports.
//!
//! Production deployments inject their own storage, inference, scheduling and
//! notification clients; these adapters back the CLI simulation and tests.

pub mod memory;

pub use memory::{
    InMemoryMaintenanceStore, RecordingNotifier, RosterScheduler, ThresholdAnomalyModel,
    TracingNotifier, WearCurvePredictor,
};
