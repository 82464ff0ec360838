//! Agent lifecycle.
//!
//! [`Agent`] is the uniform contract the coordinator and registry manage.
//! Pipeline stages implement the smaller [`Stage`] trait and are wrapped in a
//! [`StageAgent`], which owns the lifecycle state machine, the bus
//! subscriptions and the degraded marker.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::dead_letter::SubscriptionHandle;
use super::event_bus::{EventBus, EventHandler};
use crate::domain::errors::{AgentError, HandlerError, HandlerResult};
use crate::domain::models::{
    AgentStatus, AgentStatusReport, Capability, CorrelationId, EventEnvelope, EventId, EventPayload,
    EventType, HealthRecord,
};

const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// An independently lifecycled processing unit.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    /// Named abilities advertised for discovery.
    fn capabilities(&self) -> Vec<Capability>;

    /// `Created → Starting → Running`. Registers subscriptions and opens
    /// owned resources; on failure the agent ends up `Stopped`.
    async fn start(&self) -> Result<(), AgentError>;

    /// `Running → Stopping → Stopped`. No-op when already stopped.
    async fn stop(&self) -> Result<(), AgentError>;

    /// Process one event directly, outside of bus delivery.
    async fn handle(&self, event: &EventEnvelope) -> HandlerResult;

    /// Current status plus diagnostics. Never fails; a failing check is
    /// reported as degraded.
    async fn health(&self) -> HealthRecord;

    async fn status(&self) -> AgentStatus;
}

/// The stage-specific half of an agent.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// Event kinds this stage consumes.
    fn subscriptions(&self) -> Vec<EventType>;

    fn capabilities(&self) -> Vec<Capability>;

    /// Open owned resources. Called once during `start()`.
    async fn initialize(&self) -> Result<(), String> {
        Ok(())
    }

    /// Release owned resources. Called at most once per successful or
    /// failed initialization.
    async fn release(&self) {}

    /// Check collaborators; an `Err` marks the agent degraded.
    async fn check_health(&self) -> Result<(), String> {
        Ok(())
    }

    async fn process(&self, event: &EventEnvelope, ctx: &StageContext) -> HandlerResult;
}

/// What a stage may use while processing: its identity and the bus.
#[derive(Clone)]
pub struct StageContext {
    agent_id: String,
    bus: Arc<EventBus>,
}

impl StageContext {
    pub fn new(agent_id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            agent_id: agent_id.into(),
            bus,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Publish a follow-on event in `cause`'s causal chain.
    pub async fn emit(&self, cause: &EventEnvelope, payload: EventPayload) -> Result<EventId, HandlerError> {
        let event = EventEnvelope::caused_by(cause, payload, self.agent_id.clone());
        let receipt = self.bus.publish(event).await?;
        tracing::debug!(
            agent_id = %self.agent_id,
            event_id = %receipt.event_id,
            cause = %cause.event_id(),
            correlation_id = %receipt.correlation_id,
            "emitted follow-on event"
        );
        Ok(receipt.event_id)
    }
}

/// The bus-facing handler registered for each subscription.
struct StageHandler<S: Stage> {
    stage: Arc<S>,
    ctx: StageContext,
}

#[async_trait]
impl<S: Stage> EventHandler for StageHandler<S> {
    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        self.stage.process(event, &self.ctx).await
    }
}

#[derive(Debug)]
struct Lifecycle {
    status: AgentStatus,
    degraded: bool,
    detail: Option<String>,
    handles: Vec<SubscriptionHandle>,
}

/// Generic [`Agent`] driving a [`Stage`] through the lifecycle.
pub struct StageAgent<S: Stage> {
    id: String,
    stage: Arc<S>,
    bus: Arc<EventBus>,
    health_timeout: Duration,
    state: Arc<Mutex<Lifecycle>>,
    /// Set while initialized resources are held.
    resources_open: Arc<AtomicBool>,
}

impl<S: Stage> StageAgent<S> {
    pub fn new(id: impl Into<String>, stage: S, bus: Arc<EventBus>) -> Self {
        Self {
            id: id.into(),
            stage: Arc::new(stage),
            bus,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            state: Arc::new(Mutex::new(Lifecycle {
                status: AgentStatus::Created,
                degraded: false,
                detail: None,
                handles: Vec::new(),
            })),
            resources_open: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    fn context(&self) -> StageContext {
        StageContext::new(self.id.clone(), Arc::clone(&self.bus))
    }

    async fn broadcast(&self, status: AgentStatus, degraded: bool, detail: Option<String>) {
        broadcast_status(&self.bus, &self.id, status, degraded, detail).await;
    }

    async fn rollback_start(&self, state: &mut Lifecycle) {
        for handle in std::mem::take(&mut state.handles) {
            if let Err(e) = self.bus.unsubscribe(&handle).await {
                tracing::warn!(agent_id = %self.id, error = %e, "failed to remove subscription during rollback");
            }
        }
        release_once(Arc::clone(&self.stage), Arc::clone(&self.resources_open)).await;
        state.status = AgentStatus::Stopped;
    }
}

async fn broadcast_status(
    bus: &EventBus,
    agent_id: &str,
    status: AgentStatus,
    degraded: bool,
    detail: Option<String>,
) {
    let report = AgentStatusReport {
        agent_id: agent_id.to_string(),
        status,
        degraded,
        detail,
    };
    let event = EventEnvelope::new(EventPayload::AgentStatusUpdate(report), CorrelationId::new())
        .with_source(agent_id);
    if let Err(e) = bus.publish(event).await {
        tracing::debug!(agent_id = %agent_id, error = %e, "status update not published");
    }
}

/// Release the stage's resources unless already released.
async fn release_once<S: Stage>(stage: Arc<S>, resources_open: Arc<AtomicBool>) {
    if resources_open.swap(false, Ordering::SeqCst) {
        stage.release().await;
    }
}

#[async_trait]
impl<S: Stage> Agent for StageAgent<S> {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.stage.capabilities()
    }

    async fn start(&self) -> Result<(), AgentError> {
        let mut state = self.state.lock().await;
        if !state.status.can_transition_to(AgentStatus::Starting) {
            return Err(AgentError::InvalidTransition {
                from: state.status,
                to: AgentStatus::Starting,
            });
        }
        state.status = AgentStatus::Starting;
        tracing::info!(agent_id = %self.id, "starting agent");

        if let Err(reason) = self.stage.initialize().await {
            tracing::error!(agent_id = %self.id, %reason, "agent initialization failed");
            // A stage may have opened part of its resources before failing.
            self.resources_open.store(true, Ordering::SeqCst);
            self.rollback_start(&mut state).await;
            return Err(AgentError::InitializationFailed {
                agent_id: self.id.clone(),
                reason,
            });
        }
        self.resources_open.store(true, Ordering::SeqCst);

        let handler: Arc<dyn EventHandler> = Arc::new(StageHandler {
            stage: Arc::clone(&self.stage),
            ctx: self.context(),
        });
        for event_type in self.stage.subscriptions() {
            match self.bus.subscribe(event_type, Arc::clone(&handler), &self.id).await {
                Ok(handle) => state.handles.push(handle),
                Err(e) => {
                    tracing::error!(agent_id = %self.id, event_type = %event_type, error = %e, "subscription failed");
                    self.rollback_start(&mut state).await;
                    return Err(AgentError::Subscription(e));
                }
            }
        }

        state.status = AgentStatus::Running;
        state.degraded = false;
        state.detail = None;
        tracing::info!(agent_id = %self.id, subscriptions = state.handles.len(), "agent running");
        drop(state);

        self.broadcast(AgentStatus::Running, false, None).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        let mut state = Arc::clone(&self.state).lock_owned().await;
        match state.status {
            AgentStatus::Stopped => return Ok(()),
            AgentStatus::Created => {
                state.status = AgentStatus::Stopped;
                return Ok(());
            }
            AgentStatus::Starting => {
                return Err(AgentError::InvalidTransition {
                    from: AgentStatus::Starting,
                    to: AgentStatus::Stopping,
                });
            }
            AgentStatus::Running | AgentStatus::Stopping => {}
        }
        state.status = AgentStatus::Stopping;
        tracing::info!(agent_id = %self.id, "stopping agent");

        // The task owns the state lock and completes the transition even if
        // this future is dropped.
        let bus = Arc::clone(&self.bus);
        let stage = Arc::clone(&self.stage);
        let resources_open = Arc::clone(&self.resources_open);
        let agent_id = self.id.clone();
        let teardown = tokio::spawn(async move {
            for handle in std::mem::take(&mut state.handles) {
                if let Err(e) = bus.unsubscribe(&handle).await {
                    tracing::warn!(agent_id = %agent_id, error = %e, "failed to remove subscription");
                }
            }
            release_once(stage, resources_open).await;

            state.status = AgentStatus::Stopped;
            state.degraded = false;
            state.detail = None;
            tracing::info!(agent_id = %agent_id, "agent stopped");
            drop(state);

            broadcast_status(&bus, &agent_id, AgentStatus::Stopped, false, None).await;
        });
        if let Err(e) = teardown.await {
            tracing::error!(agent_id = %self.id, error = %e, "agent teardown task failed");
            release_once(Arc::clone(&self.stage), Arc::clone(&self.resources_open)).await;
            let mut state = self.state.lock().await;
            state.handles.clear();
            state.status = AgentStatus::Stopped;
            state.degraded = false;
        }
        Ok(())
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let status = self.state.lock().await.status;
        if status != AgentStatus::Running {
            return Err(HandlerError::Rejected(format!("agent {} is {status}", self.id)));
        }
        self.stage.process(event, &self.context()).await
    }

    async fn health(&self) -> HealthRecord {
        let status = self.state.lock().await.status;
        if status != AgentStatus::Running {
            return HealthRecord::new(self.id.clone(), status);
        }

        let check = match tokio::time::timeout(self.health_timeout, self.stage.check_health()).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "health check timed out after {}ms",
                self.health_timeout.as_millis()
            )),
        };

        let mut state = self.state.lock().await;
        // Stopped while the check ran.
        if state.status != AgentStatus::Running {
            return HealthRecord::new(self.id.clone(), state.status);
        }
        let was_degraded = state.degraded;
        match check {
            Ok(()) => {
                state.degraded = false;
                state.detail = None;
            }
            Err(detail) => {
                state.degraded = true;
                state.detail = Some(detail);
            }
        }
        let record = HealthRecord {
            degraded: state.degraded,
            detail: state.detail.clone(),
            ..HealthRecord::new(self.id.clone(), state.status)
        };
        drop(state);

        if record.degraded != was_degraded {
            if record.degraded {
                tracing::warn!(agent_id = %self.id, detail = ?record.detail, "agent degraded");
            } else {
                tracing::info!(agent_id = %self.id, "agent recovered");
            }
            self.broadcast(record.status, record.degraded, record.detail.clone()).await;
        }
        record
    }

    async fn status(&self) -> AgentStatus {
        self.state.lock().await.status
    }
}
