//! Domain layer for the Foreman orchestration core
//!
//! This module contains the event catalog, agent and configuration models,
//! error types, and the collaborator ports.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    AgentError, BusError, CoordinatorError, HandlerError, HandlerResult, PortError, PortResult,
    RegistryError,
};
