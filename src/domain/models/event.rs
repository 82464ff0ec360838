//! Event envelope and the closed catalog of event kinds.
//!
//! Every unit of work in the pipeline travels as an [`EventEnvelope`]. The
//! envelope's kind is derived from its payload, so a payload of one kind can
//! never be published under another kind's name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::agent::AgentStatus;
use super::maintenance::{
    AnomalyReport, CompletedMaintenance, DecisionRequest, DecisionResponse, MaintenancePrediction,
    ProcessedReading, ScheduledMaintenance, SensorReading, ValidatedAnomaly,
};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by every event of one causal chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DataReceived,
    DataProcessed,
    AnomalyDetected,
    AnomalyValidated,
    MaintenancePredicted,
    MaintenanceScheduled,
    MaintenanceCompleted,
    HumanDecisionRequired,
    HumanDecisionResponse,
    AgentStatusUpdate,
}

impl EventType {
    pub const ALL: [Self; 10] = [
        Self::DataReceived,
        Self::DataProcessed,
        Self::AnomalyDetected,
        Self::AnomalyValidated,
        Self::MaintenancePredicted,
        Self::MaintenanceScheduled,
        Self::MaintenanceCompleted,
        Self::HumanDecisionRequired,
        Self::HumanDecisionResponse,
        Self::AgentStatusUpdate,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataReceived => "data_received",
            Self::DataProcessed => "data_processed",
            Self::AnomalyDetected => "anomaly_detected",
            Self::AnomalyValidated => "anomaly_validated",
            Self::MaintenancePredicted => "maintenance_predicted",
            Self::MaintenanceScheduled => "maintenance_scheduled",
            Self::MaintenanceCompleted => "maintenance_completed",
            Self::HumanDecisionRequired => "human_decision_required",
            Self::HumanDecisionResponse => "human_decision_response",
            Self::AgentStatusUpdate => "agent_status_update",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// Health broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub agent_id: String,
    pub status: AgentStatus,
    pub degraded: bool,
    pub detail: Option<String>,
}

/// Kind-specific payload, one variant per [`EventType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    DataReceived(SensorReading),
    DataProcessed(ProcessedReading),
    AnomalyDetected(AnomalyReport),
    AnomalyValidated(ValidatedAnomaly),
    MaintenancePredicted(MaintenancePrediction),
    MaintenanceScheduled(ScheduledMaintenance),
    MaintenanceCompleted(CompletedMaintenance),
    HumanDecisionRequired(DecisionRequest),
    HumanDecisionResponse(DecisionResponse),
    AgentStatusUpdate(AgentStatusReport),
}

impl EventPayload {
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::DataReceived(_) => EventType::DataReceived,
            Self::DataProcessed(_) => EventType::DataProcessed,
            Self::AnomalyDetected(_) => EventType::AnomalyDetected,
            Self::AnomalyValidated(_) => EventType::AnomalyValidated,
            Self::MaintenancePredicted(_) => EventType::MaintenancePredicted,
            Self::MaintenanceScheduled(_) => EventType::MaintenanceScheduled,
            Self::MaintenanceCompleted(_) => EventType::MaintenanceCompleted,
            Self::HumanDecisionRequired(_) => EventType::HumanDecisionRequired,
            Self::HumanDecisionResponse(_) => EventType::HumanDecisionResponse,
            Self::AgentStatusUpdate(_) => EventType::AgentStatusUpdate,
        }
    }
}

/// Immutable unit of work published on the bus.
///
/// Fields are private so that `correlation_id` and the kind/payload pairing
/// cannot be rewritten after construction. The bus stamps `sequence` once,
/// at publish time, before sharing the envelope with subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct EventEnvelope {
    event_id: EventId,
    event_type: EventType,
    correlation_id: CorrelationId,
    /// Event that caused this one, if any.
    causation_id: Option<EventId>,
    sequence: SequenceNumber,
    timestamp: DateTime<Utc>,
    source_agent_id: Option<String>,
    payload: EventPayload,
}

/// Wire shape of an envelope before the kind/payload pairing is checked.
#[derive(Deserialize)]
struct RawEnvelope {
    event_id: EventId,
    event_type: EventType,
    correlation_id: CorrelationId,
    causation_id: Option<EventId>,
    #[serde(default = "SequenceNumber::zero")]
    sequence: SequenceNumber,
    timestamp: DateTime<Utc>,
    source_agent_id: Option<String>,
    payload: EventPayload,
}

impl TryFrom<RawEnvelope> for EventEnvelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let payload_kind = raw.payload.event_type();
        if raw.event_type != payload_kind {
            return Err(format!(
                "event_type {} does not match payload kind {payload_kind}",
                raw.event_type
            ));
        }
        Ok(Self {
            event_id: raw.event_id,
            event_type: payload_kind,
            correlation_id: raw.correlation_id,
            causation_id: raw.causation_id,
            sequence: raw.sequence,
            timestamp: raw.timestamp,
            source_agent_id: raw.source_agent_id,
            payload: raw.payload,
        })
    }
}

impl EventEnvelope {
    /// Start a new causal chain at the ingestion boundary.
    pub fn new(payload: EventPayload, correlation_id: CorrelationId) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: payload.event_type(),
            correlation_id,
            causation_id: None,
            sequence: SequenceNumber::zero(),
            timestamp: Utc::now(),
            source_agent_id: None,
            payload,
        }
    }

    /// Build a follow-on event that continues `cause`'s chain.
    pub fn caused_by(cause: &Self, payload: EventPayload, source_agent_id: impl Into<String>) -> Self {
        Self {
            causation_id: Some(cause.event_id),
            source_agent_id: Some(source_agent_id.into()),
            ..Self::new(payload, cause.correlation_id)
        }
    }

    /// Set the publishing agent on an event that starts its own chain.
    pub fn with_source(mut self, source_agent_id: impl Into<String>) -> Self {
        self.source_agent_id = Some(source_agent_id.into());
        self
    }

    pub(crate) fn stamp(mut self, sequence: SequenceNumber) -> Self {
        self.sequence = sequence;
        self
    }

    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub const fn causation_id(&self) -> Option<EventId> {
        self.causation_id
    }

    pub const fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_agent_id(&self) -> Option<&str> {
        self.source_agent_id.as_deref()
    }

    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }
}
