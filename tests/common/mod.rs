//! Common test utilities for integration tests
//!
//! Shared fixtures and helpers used across multiple integration test files.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use foreman::domain::models::{
    Config, CorrelationId, EventEnvelope, EventPayload, EventType, SensorReading,
};
use foreman::services::{handler_fn, EventBus, EventBusConfig, RetryPolicy};

pub type Recorded = Arc<Mutex<Vec<EventEnvelope>>>;

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Bus with a short backoff so retry tests finish quickly.
#[allow(dead_code)]
pub fn fast_bus(max_attempts: u32, base_delay: Duration) -> Arc<EventBus> {
    Arc::new(EventBus::new(EventBusConfig {
        retry: RetryPolicy::new(max_attempts, base_delay, base_delay * 16),
        handler_timeout: Duration::from_secs(2),
        dead_letter_capacity: None,
    }))
}

/// Default configuration with fast retries.
#[allow(dead_code)]
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.bus.max_retries = 3;
    config.bus.base_delay_ms = 10;
    config.bus.max_delay_ms = 100;
    config.bus.handler_timeout_ms = 2_000;
    config.shutdown.drain_timeout_ms = 2_000;
    config
}

#[allow(dead_code)]
pub fn reading(sensor: &str, value: f64) -> SensorReading {
    SensorReading::new(sensor, "pump-1", "temperature", value, "C")
}

#[allow(dead_code)]
pub fn reading_event(sensor: &str, value: f64, correlation_id: CorrelationId) -> EventEnvelope {
    EventEnvelope::new(EventPayload::DataReceived(reading(sensor, value)), correlation_id)
}

/// Subscribe an observer that records every event of `event_type`.
#[allow(dead_code)]
pub async fn record(bus: &EventBus, event_type: EventType) -> Recorded {
    let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        event_type,
        handler_fn(move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(event);
                Ok(())
            }
        }),
        "observer",
    )
    .await
    .expect("observer subscription");
    seen
}

/// Poll `condition` until it holds or `timeout` expires.
#[allow(dead_code)]
pub async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition().await
}
