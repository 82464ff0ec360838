use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Foreman
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Event bus delivery policy
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tuning for the pipeline stages
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Shutdown behaviour
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Event bus delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// Total delivery attempts per (event, subscription) before dead-lettering
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any retry delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-invocation handler timeout in milliseconds
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Maximum retained dead letters (oldest evicted first); unbounded if unset
    #[serde(default)]
    pub dead_letter_capacity: Option<usize>,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    100
}

const fn default_max_delay_ms() -> u64 {
    5_000
}

const fn default_handler_timeout_ms() -> u64 {
    10_000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            handler_timeout_ms: default_handler_timeout_ms(),
            dead_letter_capacity: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling JSON log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}

/// Tuning for the pipeline stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Lowest plausible sensor value; anything below is rejected
    #[serde(default = "default_min_plausible")]
    pub min_plausible_value: f64,

    /// Highest plausible sensor value; anything above is rejected
    #[serde(default = "default_max_plausible")]
    pub max_plausible_value: f64,

    /// Fraction of the plausible range, at either edge, marked as suspect
    #[serde(default = "default_suspect_margin")]
    pub suspect_margin: f64,

    /// Anomaly score at or above which a reading is reported
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Confidence at or above which an anomaly is validated automatically
    #[serde(default = "default_validation_confidence")]
    pub validation_confidence: f64,

    /// Confidence at or above which an operator is asked instead of discarding
    #[serde(default = "default_human_review_floor")]
    pub human_review_floor: f64,

    /// Window in minutes for corroborating anomalies on the same sensor
    #[serde(default = "default_corroboration_window_minutes")]
    pub corroboration_window_minutes: i64,

    /// Technicians available to the roster scheduler
    #[serde(default = "default_technicians")]
    pub technicians: Vec<String>,

    /// Operator address for review requests and schedule notifications
    #[serde(default = "default_operator_contact")]
    pub operator_contact: String,
}

const fn default_min_plausible() -> f64 {
    -50.0
}

const fn default_max_plausible() -> f64 {
    250.0
}

const fn default_suspect_margin() -> f64 {
    0.05
}

const fn default_anomaly_threshold() -> f64 {
    0.7
}

const fn default_validation_confidence() -> f64 {
    0.8
}

const fn default_human_review_floor() -> f64 {
    0.5
}

const fn default_corroboration_window_minutes() -> i64 {
    60
}

fn default_technicians() -> Vec<String> {
    vec!["on-call".to_string()]
}

fn default_operator_contact() -> String {
    "maintenance-desk".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_plausible_value: default_min_plausible(),
            max_plausible_value: default_max_plausible(),
            suspect_margin: default_suspect_margin(),
            anomaly_threshold: default_anomaly_threshold(),
            validation_confidence: default_validation_confidence(),
            human_review_floor: default_human_review_floor(),
            corroboration_window_minutes: default_corroboration_window_minutes(),
            technicians: default_technicians(),
            operator_contact: default_operator_contact(),
        }
    }
}

/// Shutdown behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ShutdownConfig {
    /// How long to wait for in-flight deliveries after agents stop
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

const fn default_drain_timeout_ms() -> u64 {
    5_000
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl ShutdownConfig {
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
