//! `foreman simulate`: run the fleet in-process against synthetic readings.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::{Collaborators, Coordinator};
use crate::cli::output::{output, CommandOutput};
use crate::cli::table::TableFormatter;
use crate::domain::models::{
    Config, CorrelationId, EventEnvelope, EventPayload, HealthRecord, MaintenanceLogEntry,
    SensorReading,
};
use crate::services::{BusStats, DeadLetterEntry, DeadLetterFilter};

/// Synthetic readings for one sensor.
#[derive(Debug, Clone)]
pub struct ReadingSeries {
    pub sensor: String,
    pub equipment: String,
    pub metric: String,
    pub unit: String,
    pub start: f64,
    pub step: f64,
    pub count: u32,
}

impl ReadingSeries {
    pub fn readings(&self) -> Vec<SensorReading> {
        (0..self.count)
            .map(|i| {
                SensorReading::new(
                    &self.sensor,
                    &self.equipment,
                    &self.metric,
                    self.start + self.step * f64::from(i),
                    &self.unit,
                )
            })
            .collect()
    }
}

/// What the fleet did with the simulated readings.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub correlation_ids: Vec<CorrelationId>,
    /// False if deliveries were still in flight when the drain timeout expired.
    pub drained: bool,
    pub stats: BusStats,
    pub health: Vec<HealthRecord>,
    pub maintenance_log: Vec<MaintenanceLogEntry>,
    pub dead_letters: Vec<DeadLetterEntry>,
}

impl CommandOutput for SimulationReport {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut lines = vec![format!(
            "Published {} reading(s): {} delivered, {} failed attempt(s), {} dead-lettered{}",
            self.correlation_ids.len(),
            self.stats.delivered,
            self.stats.failed_attempts,
            self.stats.dead_lettered,
            if self.drained { "" } else { " (drain timed out)" }
        )];

        lines.push(String::new());
        lines.push("Agents:".to_string());
        lines.push(formatter.format_health(&self.health));

        lines.push(String::new());
        if self.maintenance_log.is_empty() {
            lines.push("No maintenance scheduled.".to_string());
        } else {
            lines.push("Maintenance log:".to_string());
            lines.push(formatter.format_maintenance_log(&self.maintenance_log));
        }

        if !self.dead_letters.is_empty() {
            lines.push(String::new());
            lines.push("Dead letters:".to_string());
            lines.push(formatter.format_dead_letters(&self.dead_letters));
        }

        lines.join("\n")
    }
}

pub async fn execute(series: ReadingSeries, config: &Config, json_mode: bool) -> Result<()> {
    let report = run(config, series.readings()).await?;
    output(&report, json_mode);
    Ok(())
}

/// Start the standard fleet on in-process adapters, publish `readings`, wait
/// for the pipeline to settle and shut the fleet down again.
pub async fn run(config: &Config, readings: Vec<SensorReading>) -> Result<SimulationReport> {
    let collaborators = Collaborators::in_process(&config.pipeline);
    let coordinator = Coordinator::new(config, &collaborators);
    coordinator
        .startup()
        .await
        .context("Failed to start agent fleet")?;

    let correlation_ids = publish_all(&coordinator, readings).await?;

    let drained = coordinator
        .bus()
        .wait_idle(config.shutdown.drain_timeout())
        .await;

    let health = coordinator.fleet_health().await;
    let maintenance_log = collaborators
        .store
        .maintenance_log()
        .await
        .context("Failed to read maintenance log")?;
    let dead_letters = coordinator
        .bus()
        .get_dead_letters(&DeadLetterFilter::new())
        .await;

    coordinator
        .shutdown()
        .await
        .context("Failed to shut down agent fleet")?;

    Ok(SimulationReport {
        correlation_ids,
        drained,
        stats: coordinator.bus().stats(),
        health,
        maintenance_log,
        dead_letters,
    })
}

/// Publish every reading as the start of its own chain. The fleet is shut
/// down before a publish error is returned.
async fn publish_all(coordinator: &Coordinator, readings: Vec<SensorReading>) -> Result<Vec<CorrelationId>> {
    let mut correlation_ids = Vec::with_capacity(readings.len());
    for reading in readings {
        let correlation_id = CorrelationId::new();
        let event = EventEnvelope::new(EventPayload::DataReceived(reading), correlation_id);
        if let Err(e) = coordinator.publish_external(event).await {
            if let Err(stop_err) = coordinator.shutdown().await {
                tracing::warn!(error = %stop_err, "fleet shutdown after publish failure did not complete");
            }
            return Err(anyhow::Error::new(e).context("Failed to publish sensor reading"));
        }
        correlation_ids.push(correlation_id);
    }
    Ok(correlation_ids)
}
