//! Round-robin technician roster.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{Assignment, MaintenanceTask, Urgency};
use crate::domain::ports::Scheduler;

/// Hands tasks to technicians in turn.
#[derive(Debug)]
pub struct RosterScheduler {
    technicians: Vec<String>,
    next: AtomicUsize,
}

impl RosterScheduler {
    pub fn new(technicians: Vec<String>) -> Self {
        Self {
            technicians,
            next: AtomicUsize::new(0),
        }
    }

    fn lead_time(urgency: Urgency) -> Duration {
        match urgency {
            Urgency::Critical => Duration::zero(),
            Urgency::High => Duration::hours(4),
            Urgency::Medium => Duration::hours(24),
            Urgency::Low => Duration::hours(72),
        }
    }
}

#[async_trait]
impl Scheduler for RosterScheduler {
    async fn assign(&self, task: &MaintenanceTask) -> PortResult<Assignment> {
        if self.technicians.is_empty() {
            return Err(PortError::Scheduling("technician roster is empty".to_string()));
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst) % self.technicians.len();
        let earliest = Utc::now() + Self::lead_time(task.urgency);
        Ok(Assignment {
            technician: self.technicians[index].clone(),
            scheduled_for: earliest.min(task.due_by),
        })
    }
}
