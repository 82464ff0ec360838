//! Dead letter store.
//!
//! Holds deliveries that exhausted their retry budget. Entries are never
//! mutated; they leave the store only through an explicit operator action
//! (requeue or purge) or, when a capacity is configured, by eviction of the
//! oldest entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::{CorrelationId, EventEnvelope, EventType};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a subscription, detached from its handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub event_type: EventType,
    pub agent_id: String,
}

/// A permanently failed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub event: EventEnvelope,
    pub subscription: SubscriptionHandle,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

/// Query parameters for dead letter inspection.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterFilter {
    pub event_type: Option<EventType>,
    pub agent_id: Option<String>,
    pub correlation_id: Option<CorrelationId>,
    /// Entries that failed at or after this time.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl DeadLetterFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn since(mut self, time: DateTime<Utc>) -> Self {
        self.since = Some(time);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &DeadLetterEntry) -> bool {
        if let Some(event_type) = self.event_type {
            if entry.event.event_type() != event_type {
                return false;
            }
        }
        if let Some(ref agent_id) = self.agent_id {
            if &entry.subscription.agent_id != agent_id {
                return false;
            }
        }
        if let Some(correlation_id) = self.correlation_id {
            if entry.event.correlation_id() != correlation_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.failed_at < since {
                return false;
            }
        }
        true
    }
}

/// Append-only store of dead letters, safe for concurrent use.
#[derive(Debug, Default)]
pub struct DeadLetterStore {
    entries: RwLock<VecDeque<DeadLetterEntry>>,
    capacity: Option<usize>,
}

impl DeadLetterStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if the store was
    /// full.
    pub async fn push(&self, entry: DeadLetterEntry) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        match self.capacity {
            Some(capacity) if entries.len() > capacity => entries.pop_front(),
            _ => None,
        }
    }

    /// Matching entries, oldest first.
    pub async fn list(&self, filter: &DeadLetterFilter) -> Vec<DeadLetterEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| filter.matches(e))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Remove and return one entry.
    pub async fn take(&self, id: Uuid) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.write().await;
        let index = entries.iter().position(|e| e.id == id)?;
        entries.remove(index)
    }

    /// Put an entry back after a failed requeue, keeping failure order.
    pub(crate) async fn restore(&self, entry: DeadLetterEntry) {
        let mut entries = self.entries.write().await;
        let index = entries
            .iter()
            .position(|e| e.failed_at > entry.failed_at)
            .unwrap_or(entries.len());
        entries.insert(index, entry);
    }

    /// Remove every matching entry; `limit` is ignored.
    pub async fn purge(&self, filter: &DeadLetterFilter) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !filter.matches(e));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
