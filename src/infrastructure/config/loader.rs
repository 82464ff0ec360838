use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid max_retries: {0}. Must be at least 1")]
    InvalidMaxRetries(u32),

    #[error("Invalid backoff configuration: base_delay_ms ({0}) must not exceed max_delay_ms ({1})")]
    InvalidBackoff(u64, u64),

    #[error("Invalid handler_timeout_ms: {0}. Must be positive")]
    InvalidHandlerTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid plausibility bounds: min ({0}) must be below max ({1})")]
    InvalidPlausibilityBounds(f64, f64),

    #[error("Invalid {name}: {value}. Must be between 0 and 1")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("Invalid confidence band: human_review_floor ({0}) must not exceed validation_confidence ({1})")]
    InvalidConfidenceBand(f64, f64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .foreman/config.yaml (project config)
    /// 3. .foreman/local.yaml (local overrides, optional)
    /// 4. Environment variables (FOREMAN_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment
    /// overrides.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("FOREMAN_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".foreman/config.yaml"))
            .merge(Yaml::file(".foreman/local.yaml"))
            .merge(Env::prefixed("FOREMAN_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let bus = &config.bus;
        if bus.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(bus.max_retries));
        }
        if bus.base_delay_ms > bus.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(bus.base_delay_ms, bus.max_delay_ms));
        }
        if bus.handler_timeout_ms == 0 {
            return Err(ConfigError::InvalidHandlerTimeout(bus.handler_timeout_ms));
        }
        if bus.dead_letter_capacity == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "dead_letter_capacity must be at least 1 when set".to_string(),
            ));
        }

        let logging = &config.logging;
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(logging.rotation.clone()));
        }

        let pipeline = &config.pipeline;
        if pipeline.min_plausible_value.partial_cmp(&pipeline.max_plausible_value)
            != Some(std::cmp::Ordering::Less)
        {
            return Err(ConfigError::InvalidPlausibilityBounds(
                pipeline.min_plausible_value,
                pipeline.max_plausible_value,
            ));
        }
        for (name, value) in [
            ("suspect_margin", pipeline.suspect_margin),
            ("anomaly_threshold", pipeline.anomaly_threshold),
            ("validation_confidence", pipeline.validation_confidence),
            ("human_review_floor", pipeline.human_review_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }
        if pipeline.suspect_margin >= 0.5 {
            return Err(ConfigError::ValidationFailed(
                "suspect_margin must be below 0.5".to_string(),
            ));
        }
        if pipeline.human_review_floor > pipeline.validation_confidence {
            return Err(ConfigError::InvalidConfidenceBand(
                pipeline.human_review_floor,
                pipeline.validation_confidence,
            ));
        }
        if pipeline.corroboration_window_minutes < 0 {
            return Err(ConfigError::ValidationFailed(
                "corroboration_window_minutes cannot be negative".to_string(),
            ));
        }
        if pipeline.technicians.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "at least one technician is required".to_string(),
            ));
        }

        Ok(())
    }
}
