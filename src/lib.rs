//! Foreman - event-driven agent orchestration for predictive maintenance
//!
//! Foreman runs a fleet of pipeline agents (acquisition, anomaly detection,
//! validation, prediction, scheduling, notification and reporting) that talk
//! only through a shared event bus. The bus delivers every event to each
//! subscriber independently, retries failed deliveries with exponential
//! backoff and dead-letters deliveries that exhaust their budget.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): Event catalog, payloads, errors and collaborator ports
//! - **Service Layer** (`services`): Event bus, agent abstraction and registry
//! - **Agents** (`agents`): The pipeline stages
//! - **Application Layer** (`application`): Fleet coordinator
//! - **Adapters** (`adapters`): In-process collaborator implementations
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use foreman::application::{Collaborators, Coordinator};
//! use foreman::domain::models::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let coordinator = Coordinator::new(&config, &Collaborators::in_process(&config.pipeline));
//!     coordinator.startup().await?;
//!     coordinator.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod agents;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Collaborators, Coordinator};
pub use domain::errors::{AgentError, BusError, CoordinatorError, HandlerError, RegistryError};
pub use domain::models::{
    AgentStatus, Config, CorrelationId, EventEnvelope, EventId, EventPayload, EventType,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Agent, AgentRegistry, EventBus, EventBusConfig, EventHandler, Stage, StageAgent};
