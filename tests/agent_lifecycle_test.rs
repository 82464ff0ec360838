//! Agent lifecycle, registry and coordinator startup/shutdown tests.

mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use foreman::adapters::InMemoryMaintenanceStore;
use foreman::agents;
use foreman::application::{Collaborators, Coordinator};
use foreman::domain::errors::{
    AgentError, CoordinatorError, HandlerResult, PortError, PortResult, RegistryError,
};
use foreman::domain::models::{
    AgentStatus, Capability, CorrelationId, EventEnvelope, EventType, MaintenancePrediction,
    ValidatedAnomaly,
};
use foreman::domain::ports::FailurePredictor;
use foreman::services::{Agent, AgentRegistry, EventBus, Stage, StageAgent, StageContext};

use common::{fast_config, reading_event, record};

/// Stage that counts resource acquisition and release.
#[derive(Default)]
struct CountingStage {
    initialized: AtomicU32,
    released: AtomicU32,
}

#[async_trait]
impl Stage for CountingStage {
    fn subscriptions(&self) -> Vec<EventType> {
        vec![EventType::DataReceived]
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(Capability::SENSOR_INGESTION)]
    }

    async fn initialize(&self) -> Result<(), String> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    async fn process(&self, _event: &EventEnvelope, _ctx: &StageContext) -> HandlerResult {
        Ok(())
    }
}

/// Predictor whose model never loads.
struct OfflinePredictor;

#[async_trait]
impl FailurePredictor for OfflinePredictor {
    async fn predict(&self, _anomaly: &ValidatedAnomaly) -> PortResult<MaintenancePrediction> {
        Err(PortError::Unavailable("model not loaded".to_string()))
    }

    async fn health_check(&self) -> PortResult<()> {
        Err(PortError::Unavailable("model not loaded".to_string()))
    }
}

#[tokio::test]
async fn test_stop_twice_releases_once() {
    let bus = Arc::new(EventBus::default());
    let agent = StageAgent::new("counter", CountingStage::default(), Arc::clone(&bus));

    agent.start().await.unwrap();
    assert_eq!(bus.subscription_count().await, 1);
    agent.stop().await.unwrap();
    agent.stop().await.unwrap();

    assert_eq!(agent.status().await, AgentStatus::Stopped);
    assert_eq!(agent.stage().initialized.load(Ordering::SeqCst), 1);
    assert_eq!(agent.stage().released.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscription_count().await, 0);
}

#[tokio::test]
async fn test_stopped_agent_cannot_restart() {
    let agent = StageAgent::new("counter", CountingStage::default(), Arc::new(EventBus::default()));
    agent.start().await.unwrap();
    agent.stop().await.unwrap();

    assert!(matches!(
        agent.start().await,
        Err(AgentError::InvalidTransition {
            from: AgentStatus::Stopped,
            to: AgentStatus::Starting
        })
    ));
}

#[tokio::test]
async fn test_failed_initialization_leaves_no_agent_running() {
    let config = fast_config();
    let mut collaborators = Collaborators::in_process(&config.pipeline);
    collaborators.predictor = Arc::new(OfflinePredictor);
    let coordinator = Coordinator::new(&config, &collaborators);

    let err = coordinator.startup().await.unwrap_err();
    match err {
        CoordinatorError::Startup { ref agent_id, ref source } => {
            assert_eq!(agent_id, agents::PREDICTION);
            assert!(matches!(source, AgentError::InitializationFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    let statuses = coordinator.agent_statuses().await;
    assert_eq!(statuses.len(), agents::STARTUP_ORDER.len());
    for (id, status) in statuses {
        assert_ne!(status, AgentStatus::Running, "{id} left running");
    }
    assert!(coordinator.registry().is_empty().await);
    assert_eq!(coordinator.bus().subscription_count().await, 0);
    assert!(!coordinator.is_running().await);
}

#[tokio::test]
async fn test_store_offline_fails_startup() {
    let config = fast_config();
    let store = Arc::new(InMemoryMaintenanceStore::new());
    store.set_available(false);
    let mut collaborators = Collaborators::in_process(&config.pipeline);
    collaborators.store = store;
    let coordinator = Coordinator::new(&config, &collaborators);

    assert!(matches!(
        coordinator.startup().await,
        Err(CoordinatorError::Startup { .. })
    ));
    for (_, status) in coordinator.agent_statuses().await {
        assert_ne!(status, AgentStatus::Running);
    }
}

#[tokio::test]
async fn test_full_fleet_registers_capabilities() {
    let config = fast_config();
    let coordinator = Coordinator::new(&config, &Collaborators::in_process(&config.pipeline));
    coordinator.startup().await.unwrap();

    let registry = coordinator.registry();
    assert_eq!(registry.len().await, 7);
    let reviewers = registry
        .list_by_capability(&Capability::new(Capability::HUMAN_REVIEW))
        .await;
    assert_eq!(reviewers.len(), 1);
    assert_eq!(reviewers[0].id(), agents::VALIDATION);
    assert!(coordinator.fleet_health().await.iter().all(|r| r.is_healthy()));

    assert!(matches!(
        coordinator.startup().await,
        Err(CoordinatorError::AlreadyStarted)
    ));

    coordinator.shutdown().await.unwrap();
    assert!(registry.is_empty().await);
    for (_, status) in coordinator.agent_statuses().await {
        assert_eq!(status, AgentStatus::Stopped);
    }
    assert!(matches!(
        coordinator
            .publish_external(reading_event("s-1", 40.0, CorrelationId::new()))
            .await,
        Err(CoordinatorError::NotRunning)
    ));
}

#[tokio::test]
async fn test_startup_broadcasts_status_updates() {
    let config = fast_config();
    let coordinator = Coordinator::new(&config, &Collaborators::in_process(&config.pipeline));
    let updates = record(coordinator.bus(), EventType::AgentStatusUpdate).await;

    coordinator.startup().await.unwrap();
    assert!(coordinator.bus().wait_idle(Duration::from_secs(1)).await);
    assert_eq!(updates.lock().await.len(), 7);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_registry_rejects_duplicate_live_id() {
    let bus = Arc::new(EventBus::default());
    let registry = AgentRegistry::new();
    let first: Arc<dyn Agent> = Arc::new(StageAgent::new("twin", CountingStage::default(), Arc::clone(&bus)));
    let second: Arc<dyn Agent> = Arc::new(StageAgent::new("twin", CountingStage::default(), bus));

    registry.register(&first).await.unwrap();
    assert_eq!(
        registry.register(&second).await.unwrap_err(),
        RegistryError::DuplicateAgent("twin".to_string())
    );
    assert!(Arc::ptr_eq(&registry.get("twin").await.unwrap(), &first));
}
