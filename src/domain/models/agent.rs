use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Agent lifecycle status.
///
/// `Created → Starting → Running → Stopping → Stopped`, with
/// `Starting → Stopped` when initialization fails. Degradation is tracked
/// separately on [`HealthRecord`] and never changes the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl AgentStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting, Self::Stopped)
                | (Self::Running, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
        )
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for AgentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            _ => Err(anyhow::anyhow!("Invalid agent status: {s}")),
        }
    }
}

/// A named ability an agent advertises for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub const SENSOR_INGESTION: &'static str = "sensor-ingestion";
    pub const ANOMALY_DETECTION: &'static str = "anomaly-detection";
    pub const ANOMALY_VALIDATION: &'static str = "anomaly-validation";
    pub const HUMAN_REVIEW: &'static str = "human-review";
    pub const FAILURE_PREDICTION: &'static str = "failure-prediction";
    pub const MAINTENANCE_SCHEDULING: &'static str = "maintenance-scheduling";
    pub const NOTIFICATION: &'static str = "notification";
    pub const MAINTENANCE_LOGGING: &'static str = "maintenance-logging";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Point-in-time health of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    /// Set while running if a health check failed.
    pub degraded: bool,
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthRecord {
    pub fn new(agent_id: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            agent_id: agent_id.into(),
            status,
            degraded: false,
            detail: None,
            checked_at: Utc::now(),
        }
    }

    pub fn degraded(mut self, detail: impl Into<String>) -> Self {
        self.degraded = true;
        self.detail = Some(detail.into());
        self
    }

    /// Running and not degraded.
    pub fn is_healthy(&self) -> bool {
        self.status == AgentStatus::Running && !self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_status_serialization() {
        assert_eq!(AgentStatus::Created.to_string(), "created");
        assert_eq!(AgentStatus::Running.to_string(), "running");
        assert_eq!(AgentStatus::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_agent_status_from_str() {
        assert_eq!("running".parse::<AgentStatus>().unwrap(), AgentStatus::Running);
        assert_eq!("STOPPED".parse::<AgentStatus>().unwrap(), AgentStatus::Stopped);
        assert!("paused".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn test_lifecycle_transitions() {
        use AgentStatus::*;
        assert!(Created.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));

        assert!(!Created.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Starting));
        assert!(!Running.can_transition_to(Starting));
    }

    #[test]
    fn test_health_record() {
        let healthy = HealthRecord::new("anomaly", AgentStatus::Running);
        assert!(healthy.is_healthy());

        let degraded = HealthRecord::new("anomaly", AgentStatus::Running).degraded("model store unreachable");
        assert!(!degraded.is_healthy());
        assert_eq!(degraded.detail.as_deref(), Some("model store unreachable"));

        assert!(!HealthRecord::new("anomaly", AgentStatus::Stopped).is_healthy());
    }
}
