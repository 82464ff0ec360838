//! Memory-backed adapters.

pub mod inference;
pub mod notifier;
pub mod scheduler;
pub mod store;

pub use inference::{ThresholdAnomalyModel, WearCurvePredictor};
pub use notifier::{RecordingNotifier, TracingNotifier};
pub use scheduler::RosterScheduler;
pub use store::InMemoryMaintenanceStore;
