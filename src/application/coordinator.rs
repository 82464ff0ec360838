//! Fleet coordinator.
//!
//! Owns the shared event bus and the pipeline agents. Agents are started in
//! [`STARTUP_ORDER`](crate::agents::STARTUP_ORDER), consumers first, and
//! stopped in reverse. A failed start rolls the fleet back so no agent is left
//! running.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::{
    InMemoryMaintenanceStore, RosterScheduler, ThresholdAnomalyModel, TracingNotifier,
    WearCurvePredictor,
};
use crate::agents::{
    self, acquisition::PlausibilityBounds, validation::ValidationPolicy, AcquisitionStage,
    AnomalyDetectionStage, NotificationStage, PredictionStage, ReportingStage, SchedulingStage,
    ValidationStage,
};
use crate::domain::errors::{BusError, CoordinatorError};
use crate::domain::models::{AgentStatus, Config, EventEnvelope, HealthRecord, PipelineConfig};
use crate::domain::ports::{AnomalyModel, FailurePredictor, MaintenanceStore, Notifier, Scheduler};
use crate::services::{Agent, AgentRegistry, EventBus, EventBusConfig, PublishReceipt, StageAgent};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// External collaborators injected into the stages.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn MaintenanceStore>,
    pub anomaly_model: Arc<dyn AnomalyModel>,
    pub predictor: Arc<dyn FailurePredictor>,
    pub scheduler: Arc<dyn Scheduler>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// In-process adapters for local runs.
    pub fn in_process(pipeline: &PipelineConfig) -> Self {
        Self {
            store: Arc::new(InMemoryMaintenanceStore::new()),
            anomaly_model: Arc::new(ThresholdAnomalyModel::default()),
            predictor: Arc::new(WearCurvePredictor::default()),
            scheduler: Arc::new(RosterScheduler::new(pipeline.technicians.clone())),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

/// Build the seven pipeline agents in startup order.
pub fn build_fleet(
    pipeline: &PipelineConfig,
    collaborators: &Collaborators,
    bus: &Arc<EventBus>,
) -> Vec<Arc<dyn Agent>> {
    let c = collaborators;
    vec![
        Arc::new(StageAgent::new(
            agents::REPORTING,
            ReportingStage::new(Arc::clone(&c.store)),
            Arc::clone(bus),
        )),
        Arc::new(StageAgent::new(
            agents::NOTIFICATION,
            NotificationStage::new(Arc::clone(&c.notifier), pipeline.operator_contact.clone()),
            Arc::clone(bus),
        )),
        Arc::new(StageAgent::new(
            agents::SCHEDULING,
            SchedulingStage::new(Arc::clone(&c.scheduler)),
            Arc::clone(bus),
        )),
        Arc::new(StageAgent::new(
            agents::PREDICTION,
            PredictionStage::new(Arc::clone(&c.predictor)),
            Arc::clone(bus),
        )),
        Arc::new(StageAgent::new(
            agents::VALIDATION,
            ValidationStage::new(Arc::clone(&c.store), ValidationPolicy::from_config(pipeline)),
            Arc::clone(bus),
        )),
        Arc::new(StageAgent::new(
            agents::ANOMALY_DETECTION,
            AnomalyDetectionStage::new(
                Arc::clone(&c.anomaly_model),
                Arc::clone(&c.store),
                pipeline.anomaly_threshold,
            ),
            Arc::clone(bus),
        )),
        Arc::new(StageAgent::new(
            agents::ACQUISITION,
            AcquisitionStage::new(Arc::clone(&c.store), PlausibilityBounds::from_config(pipeline)),
            Arc::clone(bus),
        )),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FleetState {
    Idle,
    Running,
    ShutDown,
}

/// Owns agent construction, startup/shutdown ordering and the shared bus.
pub struct Coordinator {
    bus: Arc<EventBus>,
    registry: AgentRegistry,
    agents: Vec<Arc<dyn Agent>>,
    state: Mutex<FleetState>,
    drain_timeout: Duration,
}

impl Coordinator {
    /// Wire the standard pipeline from configuration and collaborators.
    pub fn new(config: &Config, collaborators: &Collaborators) -> Self {
        let bus = Arc::new(EventBus::new(EventBusConfig::from(&config.bus)));
        let agents = build_fleet(&config.pipeline, collaborators, &bus);
        Self::with_agents(bus, agents).with_drain_timeout(config.shutdown.drain_timeout())
    }

    /// Use a custom fleet; `agents` are started in the given order.
    pub fn with_agents(bus: Arc<EventBus>, agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            bus,
            registry: AgentRegistry::new(),
            agents,
            state: Mutex::new(FleetState::Idle),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Start every agent in order. On failure, agents already started are
    /// stopped again in reverse and the error is returned.
    pub async fn startup(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().await;
        match *state {
            FleetState::Running => return Err(CoordinatorError::AlreadyStarted),
            FleetState::ShutDown => return Err(CoordinatorError::Bus(BusError::Closed)),
            FleetState::Idle => {}
        }

        info!(agents = self.agents.len(), "starting agent fleet");
        let mut started: Vec<Arc<dyn Agent>> = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            if let Err(source) = agent.start().await {
                error!(agent_id = %agent.id(), error = %source, "agent failed to start, rolling back");
                self.rollback(&started).await;
                return Err(CoordinatorError::Startup {
                    agent_id: agent.id().to_string(),
                    source,
                });
            }
            started.push(Arc::clone(agent));

            if let Err(e) = self.registry.register(agent).await {
                error!(agent_id = %agent.id(), error = %e, "agent registration failed, rolling back");
                self.rollback(&started).await;
                return Err(e.into());
            }
            debug!(agent_id = %agent.id(), "agent online");
        }

        *state = FleetState::Running;
        info!("agent fleet running");
        Ok(())
    }

    async fn rollback(&self, started: &[Arc<dyn Agent>]) {
        for agent in started.iter().rev() {
            if let Err(e) = agent.stop().await {
                warn!(agent_id = %agent.id(), error = %e, "failed to stop agent during rollback");
            }
            // Not registered yet if registration was what failed.
            if let Err(e) = self.registry.unregister(agent.id()).await {
                debug!(agent_id = %agent.id(), error = %e, "agent was not registered");
            }
        }
    }

    /// Stop every agent in reverse startup order, drain in-flight deliveries
    /// and close the bus. Individual stop failures are logged and skipped.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().await;
        if *state != FleetState::Running {
            return Err(CoordinatorError::NotRunning);
        }

        info!("shutting down agent fleet");
        for agent in self.agents.iter().rev() {
            match agent.stop().await {
                Ok(()) => debug!(agent_id = %agent.id(), "agent stopped"),
                Err(e) => warn!(agent_id = %agent.id(), error = %e, "agent failed to stop cleanly"),
            }
            if let Err(e) = self.registry.unregister(agent.id()).await {
                debug!(agent_id = %agent.id(), error = %e, "agent was not registered");
            }
        }

        if !self.bus.wait_idle(self.drain_timeout).await {
            warn!(
                in_flight = self.bus.in_flight(),
                timeout_ms = u64::try_from(self.drain_timeout.as_millis()).unwrap_or(u64::MAX),
                "deliveries still in flight at shutdown"
            );
        }
        self.bus.close();
        *state = FleetState::ShutDown;

        let stats = self.bus.stats();
        info!(
            published = stats.published,
            delivered = stats.delivered,
            dead_lettered = stats.dead_lettered,
            "agent fleet stopped"
        );
        Ok(())
    }

    /// Inject a new causal chain from outside the fleet.
    pub async fn publish_external(&self, event: EventEnvelope) -> Result<PublishReceipt, CoordinatorError> {
        if !self.is_running().await {
            return Err(CoordinatorError::NotRunning);
        }
        debug!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            correlation_id = %event.correlation_id(),
            "external event received"
        );
        Ok(self.bus.publish(event).await?)
    }

    /// Health of every registered agent.
    pub async fn fleet_health(&self) -> Vec<HealthRecord> {
        self.registry.health_report().await
    }

    /// Status of every agent in the fleet, in startup order.
    pub async fn agent_statuses(&self) -> Vec<(String, AgentStatus)> {
        let mut statuses = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            statuses.push((agent.id().to_string(), agent.status().await));
        }
        statuses
    }

    pub const fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub async fn is_running(&self) -> bool {
        *self.state.lock().await == FleetState::Running
    }
}
