pub mod agent;
pub mod config;
pub mod event;
pub mod maintenance;

pub use agent::{AgentStatus, Capability, HealthRecord};
pub use config::{BusConfig, Config, LoggingConfig, PipelineConfig, ShutdownConfig};
pub use event::{
    AgentStatusReport, CorrelationId, EventEnvelope, EventId, EventPayload, EventType,
    SequenceNumber,
};
pub use maintenance::{
    AnomalyReport, Assignment, CompletedMaintenance, DecisionRequest, DecisionResponse,
    MaintenanceLogEntry, MaintenancePrediction, MaintenanceTask, Notification, ProcessedReading,
    ReadingQuality, ScheduledMaintenance, SensorReading, Urgency, ValidatedAnomaly,
};
