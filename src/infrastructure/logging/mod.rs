//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Console output in pretty or JSON format
//! - Rolling JSON log files via tracing-appender

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
