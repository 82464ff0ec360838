//! Domain errors for the Foreman orchestration core.
//!
//! One enum per failure class: handler failures drive the bus retry state
//! machine, agent errors surface from the lifecycle, registry and bus errors
//! are returned synchronously to the caller, and port errors come from the
//! opaque collaborators the stages call into.

use thiserror::Error;

use super::models::agent::AgentStatus;

/// Failure of one agent's processing of one event.
///
/// This is what the event bus observes to decide between retry and
/// dead-lettering.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("event rejected: {0}")]
    Rejected(String),

    #[error("collaborator failure: {0}")]
    Collaborator(String),

    #[error("unexpected payload: expected {expected}, got {actual}")]
    UnexpectedPayload { expected: String, actual: String },

    #[error("handler timed out after {0}ms")]
    Timeout(u64),

    #[error("failed to publish follow-on event: {0}")]
    Publish(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl From<PortError> for HandlerError {
    fn from(err: PortError) -> Self {
        Self::Collaborator(err.to_string())
    }
}

impl From<BusError> for HandlerError {
    fn from(err: BusError) -> Self {
        Self::Publish(err.to_string())
    }
}

/// Errors raised by the event bus itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("event bus is closed")]
    Closed,

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("dead letter entry not found: {0}")]
    DeadLetterNotFound(String),
}

/// Agent lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent {agent_id} failed to initialize: {reason}")]
    InitializationFailed { agent_id: String, reason: String },

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: AgentStatus, to: AgentStatus },

    #[error("subscription failed: {0}")]
    Subscription(#[from] BusError),
}

/// Agent registry lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),
}

/// Errors surfaced by the coordinator to whatever drives it.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("startup failed at agent {agent_id}: {source}")]
    Startup {
        agent_id: String,
        #[source]
        source: AgentError,
    },

    #[error("coordinator already started")]
    AlreadyStarted,

    #[error("coordinator is not running")]
    NotRunning,

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Failure of an external collaborator (storage, inference, scheduling,
/// notification).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

pub type HandlerResult = Result<(), HandlerError>;

pub type PortResult<T> = Result<T, PortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_becomes_collaborator_failure() {
        let err: HandlerError = PortError::Storage("disk full".to_string()).into();
        assert_eq!(
            err,
            HandlerError::Collaborator("storage error: disk full".to_string())
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AgentError::InvalidTransition {
            from: AgentStatus::Running,
            to: AgentStatus::Starting,
        };
        assert_eq!(
            err.to_string(),
            "invalid lifecycle transition from running to starting"
        );
    }

    #[test]
    fn test_startup_error_keeps_source() {
        let err = CoordinatorError::Startup {
            agent_id: "acquisition".to_string(),
            source: AgentError::InitializationFailed {
                agent_id: "acquisition".to_string(),
                reason: "store offline".to_string(),
            },
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("agent acquisition failed to initialize: store offline")
        );
    }
}
