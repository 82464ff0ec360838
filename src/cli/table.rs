//! Table output formatting for CLI commands
//!
//! Renders agent health, the maintenance log and dead letters with
//! comfy-table. Colors are disabled for `NO_COLOR` and dumb terminals.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::output::truncate;
use crate::domain::models::{AgentStatus, HealthRecord, MaintenanceLogEntry, Urgency};
use crate::services::DeadLetterEntry;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub const fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    pub fn format_health(&self, records: &[HealthRecord]) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["Agent", "Status", "Health", "Detail"]));

        for record in records {
            let status = Cell::new(record.status.to_string());
            let status = if self.use_colors {
                status.fg(agent_status_color(record.status))
            } else {
                status
            };
            let health = if record.is_healthy() {
                "ok"
            } else if record.degraded {
                "degraded"
            } else {
                "down"
            };
            table.add_row(vec![
                Cell::new(&record.agent_id),
                status,
                Cell::new(health),
                Cell::new(record.detail.as_deref().unwrap_or("-")),
            ]);
        }

        table.to_string()
    }

    pub fn format_maintenance_log(&self, entries: &[MaintenanceLogEntry]) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["Task", "Kind", "Equipment", "Technician", "Urgency", "Action"]));

        for entry in entries {
            let task_short: String = entry.task_id().to_string().chars().take(8).collect();
            let row = match entry {
                MaintenanceLogEntry::Scheduled(s) => {
                    let urgency = Cell::new(s.task.urgency.to_string());
                    vec![
                        Cell::new(task_short),
                        Cell::new("scheduled"),
                        Cell::new(&s.task.equipment_id),
                        Cell::new(&s.assignment.technician),
                        if self.use_colors {
                            urgency.fg(urgency_color(s.task.urgency))
                        } else {
                            urgency
                        },
                        Cell::new(truncate(&s.task.action, 48)),
                    ]
                }
                MaintenanceLogEntry::Completed(c) => vec![
                    Cell::new(task_short),
                    Cell::new("completed"),
                    Cell::new(&c.equipment_id),
                    Cell::new(&c.technician),
                    Cell::new("-"),
                    Cell::new(truncate(c.notes.as_deref().unwrap_or("-"), 48)),
                ],
            };
            table.add_row(row);
        }

        table.to_string()
    }

    pub fn format_dead_letters(&self, entries: &[DeadLetterEntry]) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["Entry", "Event", "Agent", "Attempts", "Last error"]));

        for entry in entries {
            let entry_short: String = entry.id.to_string().chars().take(8).collect();
            let error = Cell::new(truncate(&entry.last_error, 60));
            table.add_row(vec![
                Cell::new(entry_short),
                Cell::new(entry.event.event_type().to_string()),
                Cell::new(&entry.subscription.agent_id),
                Cell::new(entry.attempts),
                if self.use_colors { error.fg(Color::Red) } else { error },
            ]);
        }

        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn create_base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

const fn agent_status_color(status: AgentStatus) -> Color {
    match status {
        AgentStatus::Running => Color::Green,
        AgentStatus::Starting | AgentStatus::Stopping => Color::Yellow,
        AgentStatus::Created => Color::Cyan,
        AgentStatus::Stopped => Color::DarkGrey,
    }
}

const fn urgency_color(urgency: Urgency) -> Color {
    match urgency {
        Urgency::Critical => Color::Red,
        Urgency::High => Color::Magenta,
        Urgency::Medium => Color::Yellow,
        Urgency::Low => Color::Green,
    }
}
