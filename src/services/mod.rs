//! Orchestration services: the event bus and the agent framework.

pub mod agent;
pub mod agent_registry;
pub mod dead_letter;
pub mod event_bus;
pub mod retry;

pub use agent::{Agent, Stage, StageAgent, StageContext};
pub use agent_registry::AgentRegistry;
pub use dead_letter::{
    DeadLetterEntry, DeadLetterFilter, DeadLetterStore, SubscriptionHandle, SubscriptionId,
};
pub use event_bus::{
    handler_fn, BusStats, DeliveryOutcome, EventBus, EventBusConfig, EventHandler, FnHandler,
    PublishOutcome, PublishReceipt,
};
pub use retry::RetryPolicy;
