//! Agent registry.
//!
//! Maps agent ids to live agents for discovery and health aggregation. The
//! registry holds weak references only; the coordinator owns the agents.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

use super::agent::Agent;
use crate::domain::errors::RegistryError;
use crate::domain::models::{Capability, HealthRecord};

/// Registry of live agents keyed by id.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Weak<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Fails if a live agent already holds the id; an
    /// entry whose agent has been dropped is replaced.
    pub async fn register(&self, agent: &Arc<dyn Agent>) -> Result<(), RegistryError> {
        let id = agent.id().to_string();
        let mut agents = self.agents.write().await;
        if agents.get(&id).is_some_and(|existing| existing.strong_count() > 0) {
            return Err(RegistryError::DuplicateAgent(id));
        }
        tracing::debug!(agent_id = %id, "agent registered");
        agents.insert(id, Arc::downgrade(agent));
        Ok(())
    }

    pub async fn unregister(&self, agent_id: &str) -> Result<(), RegistryError> {
        self.agents
            .write()
            .await
            .remove(agent_id)
            .map(|_| tracing::debug!(agent_id = %agent_id, "agent unregistered"))
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.to_string()))
    }

    pub async fn get(&self, agent_id: &str) -> Result<Arc<dyn Agent>, RegistryError> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| RegistryError::AgentNotFound(agent_id.to_string()))
    }

    /// Live agents advertising `capability`, sorted by id.
    pub async fn list_by_capability(&self, capability: &Capability) -> Vec<Arc<dyn Agent>> {
        let mut matching: Vec<Arc<dyn Agent>> = self
            .live()
            .await
            .into_iter()
            .filter(|agent| agent.capabilities().contains(capability))
            .collect();
        matching.sort_by(|a, b| a.id().cmp(b.id()));
        matching
    }

    /// All live agents, sorted by id.
    pub async fn list(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents = self.live().await;
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        agents
    }

    pub async fn len(&self) -> usize {
        self.live().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Health of every live agent, sorted by id. Checks run concurrently.
    pub async fn health_report(&self) -> Vec<HealthRecord> {
        let agents = self.list().await;
        futures::future::join_all(agents.iter().map(|agent| agent.health())).await
    }

    async fn live(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.values().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{AgentError, HandlerResult};
    use crate::domain::models::{AgentStatus, EventEnvelope};
    use async_trait::async_trait;

    struct FixedAgent {
        id: String,
        capabilities: Vec<Capability>,
    }

    impl FixedAgent {
        fn shared(id: &str, capabilities: &[&str]) -> Arc<dyn Agent> {
            Arc::new(Self {
                id: id.to_string(),
                capabilities: capabilities.iter().map(|c| Capability::from(*c)).collect(),
            })
        }
    }

    #[async_trait]
    impl Agent for FixedAgent {
        fn id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> Vec<Capability> {
            self.capabilities.clone()
        }

        async fn start(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), AgentError> {
            Ok(())
        }

        async fn handle(&self, _event: &EventEnvelope) -> HandlerResult {
            Ok(())
        }

        async fn health(&self) -> HealthRecord {
            HealthRecord::new(self.id.clone(), AgentStatus::Running)
        }

        async fn status(&self) -> AgentStatus {
            AgentStatus::Running
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = AgentRegistry::new();
        let agent = FixedAgent::shared("acquisition", &[Capability::SENSOR_INGESTION]);
        registry.register(&agent).await.unwrap();

        let found = registry.get("acquisition").await.unwrap();
        assert_eq!(found.id(), "acquisition");
        assert!(matches!(
            registry.get("nobody").await,
            Err(RegistryError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let registry = AgentRegistry::new();
        let first = FixedAgent::shared("anomaly", &[]);
        let second = FixedAgent::shared("anomaly", &[]);
        registry.register(&first).await.unwrap();

        let err = registry.register(&second).await.unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAgent("anomaly".to_string()));
        // Original entry is untouched.
        assert!(Arc::ptr_eq(&registry.get("anomaly").await.unwrap(), &first));
    }

    #[tokio::test]
    async fn test_dropped_agent_is_not_live() {
        let registry = AgentRegistry::new();
        let agent = FixedAgent::shared("prediction", &[]);
        registry.register(&agent).await.unwrap();
        drop(agent);

        assert!(registry.get("prediction").await.is_err());
        assert!(registry.is_empty().await);
        let replacement = FixedAgent::shared("prediction", &[]);
        registry.register(&replacement).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_capability() {
        let registry = AgentRegistry::new();
        let agents = [
            FixedAgent::shared("validation", &[Capability::ANOMALY_VALIDATION, Capability::HUMAN_REVIEW]),
            FixedAgent::shared("notification", &[Capability::NOTIFICATION]),
            FixedAgent::shared("reviewer", &[Capability::HUMAN_REVIEW]),
        ];
        for agent in &agents {
            registry.register(agent).await.unwrap();
        }

        let reviewers = registry
            .list_by_capability(&Capability::new(Capability::HUMAN_REVIEW))
            .await;
        let ids: Vec<&str> = reviewers.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["reviewer", "validation"]);
        assert!(registry
            .list_by_capability(&Capability::new("teleportation"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = AgentRegistry::new();
        let agent = FixedAgent::shared("reporting", &[]);
        registry.register(&agent).await.unwrap();
        registry.unregister("reporting").await.unwrap();

        assert!(registry.get("reporting").await.is_err());
        assert!(matches!(
            registry.unregister("reporting").await,
            Err(RegistryError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_health_report_sorted() {
        let registry = AgentRegistry::new();
        let b = FixedAgent::shared("b", &[]);
        let a = FixedAgent::shared("a", &[]);
        registry.register(&b).await.unwrap();
        registry.register(&a).await.unwrap();

        let report = registry.health_report().await;
        let ids: Vec<&str> = report.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
