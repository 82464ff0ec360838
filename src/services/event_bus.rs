//! EventBus service: in-process publish/subscribe with retry and
//! dead-lettering.
//!
//! Every publication is fanned out to all subscriptions for its event type.
//! Each (event, subscription) pair is delivered by its own task, so a slow or
//! failing handler never holds up another subscriber or another event. Failed
//! deliveries are retried with exponential backoff and moved to the
//! [`DeadLetterStore`] once the retry budget is spent.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::dead_letter::{
    DeadLetterEntry, DeadLetterFilter, DeadLetterStore, SubscriptionHandle, SubscriptionId,
};
use super::retry::RetryPolicy;
use crate::domain::errors::{BusError, HandlerError, HandlerResult};
use crate::domain::models::{BusConfig, CorrelationId, EventEnvelope, EventId, EventType, SequenceNumber};

/// Something that can receive events from the bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event. An `Err` drives the retry/dead-letter state machine.
    async fn handle(&self, event: &EventEnvelope) -> HandlerResult;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub retry: RetryPolicy,
    /// Upper bound on a single handler invocation.
    pub handler_timeout: Duration,
    /// Maximum retained dead letters; unbounded if `None`.
    pub dead_letter_capacity: Option<usize>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

impl From<&BusConfig> for EventBusConfig {
    fn from(config: &BusConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            handler_timeout: Duration::from_millis(config.handler_timeout_ms),
            dead_letter_capacity: config.dead_letter_capacity,
        }
    }
}

struct Subscription {
    handle: SubscriptionHandle,
    handler: Arc<dyn EventHandler>,
    active: AtomicBool,
}

impl Subscription {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Final state of one (event, subscription) delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    DeadLettered { entry_id: Uuid, attempts: u32 },
}

/// Aggregate result of all deliveries for one publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dead_lettered: usize,
    /// Delivery tasks that ended without reporting (runtime shut down).
    pub unresolved: usize,
}

impl PublishOutcome {
    pub const fn all_delivered(&self) -> bool {
        self.dead_lettered == 0 && self.unresolved == 0
    }
}

/// Returned by [`EventBus::publish`]. Dropping it does not cancel anything;
/// awaiting [`wait`](Self::wait) yields the aggregate outcome.
#[derive(Debug)]
pub struct PublishReceipt {
    pub event_id: EventId,
    pub sequence: SequenceNumber,
    pub correlation_id: CorrelationId,
    deliveries: Vec<JoinHandle<DeliveryOutcome>>,
}

impl PublishReceipt {
    /// Number of subscriptions the event was dispatched to.
    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait until every delivery has succeeded or been dead-lettered.
    pub async fn wait(self) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        for result in futures::future::join_all(self.deliveries).await {
            match result {
                Ok(DeliveryOutcome::Delivered { .. }) => outcome.delivered += 1,
                Ok(DeliveryOutcome::DeadLettered { .. }) => outcome.dead_lettered += 1,
                Err(e) => {
                    tracing::error!(event_id = %self.event_id, error = %e, "delivery task did not complete");
                    outcome.unresolved += 1;
                }
            }
        }
        outcome
    }
}

/// Counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub failed_attempts: u64,
    pub dead_lettered: u64,
    /// Publications that matched no subscription.
    pub dropped: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct BusCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicUsize,
}

/// Decrements the in-flight count however the delivery task ends.
struct InFlightGuard(Arc<BusCounters>);

impl InFlightGuard {
    fn enter(counters: Arc<BusCounters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a delivery task needs, detached from the bus.
#[derive(Clone)]
struct DeliveryContext {
    retry: RetryPolicy,
    handler_timeout: Duration,
    dead_letters: Arc<DeadLetterStore>,
    counters: Arc<BusCounters>,
}

/// Central event bus shared by every agent.
pub struct EventBus {
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    dead_letters: Arc<DeadLetterStore>,
    counters: Arc<BusCounters>,
    sequence: AtomicU64,
    closed: AtomicBool,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            dead_letters: Arc::new(DeadLetterStore::new(config.dead_letter_capacity)),
            counters: Arc::new(BusCounters::default()),
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub const fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Register `handler` for every future event of `event_type`.
    ///
    /// Subscribing the same handler twice creates two bindings.
    pub async fn subscribe(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
        agent_id: &str,
    ) -> Result<SubscriptionHandle, BusError> {
        if agent_id.trim().is_empty() {
            return Err(BusError::InvalidSubscription(
                "owning agent id must not be empty".to_string(),
            ));
        }
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let handle = SubscriptionHandle {
            id: SubscriptionId::new(),
            event_type,
            agent_id: agent_id.to_string(),
        };
        let subscription = Arc::new(Subscription {
            handle: handle.clone(),
            handler,
            active: AtomicBool::new(true),
        });
        self.subscriptions.write().await.push(subscription);

        tracing::debug!(
            subscription = %handle.id,
            event_type = %event_type,
            agent_id = %agent_id,
            "subscribed"
        );
        Ok(handle)
    }

    /// Remove a binding. Invocations already running finish normally; pending
    /// retries for it are dead-lettered instead of re-invoked.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), BusError> {
        let mut subscriptions = self.subscriptions.write().await;
        let index = subscriptions
            .iter()
            .position(|s| s.handle.id == handle.id)
            .ok_or_else(|| BusError::SubscriptionNotFound(handle.id.to_string()))?;
        let removed = subscriptions.remove(index);
        removed.active.store(false, Ordering::SeqCst);

        tracing::debug!(
            subscription = %handle.id,
            event_type = %handle.event_type,
            agent_id = %handle.agent_id,
            "unsubscribed"
        );
        Ok(())
    }

    /// Publish an event to every matching subscription.
    ///
    /// Returns as soon as the deliveries are scheduled. An event nobody
    /// subscribes to is dropped.
    pub async fn publish(&self, event: EventEnvelope) -> Result<PublishReceipt, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let sequence = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        let event = Arc::new(event.stamp(sequence));
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<Arc<Subscription>> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .filter(|s| s.handle.event_type == event.event_type())
                .cloned()
                .collect()
        };

        if targets.is_empty() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                correlation_id = %event.correlation_id(),
                "no subscribers, event dropped"
            );
        } else {
            tracing::debug!(
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                correlation_id = %event.correlation_id(),
                sequence = %sequence,
                subscribers = targets.len(),
                "publishing"
            );
        }

        let deliveries = targets
            .into_iter()
            .map(|subscription| self.dispatch(Arc::clone(&event), subscription))
            .collect();

        Ok(PublishReceipt {
            event_id: event.event_id(),
            sequence,
            correlation_id: event.correlation_id(),
            deliveries,
        })
    }

    fn dispatch(&self, event: Arc<EventEnvelope>, subscription: Arc<Subscription>) -> JoinHandle<DeliveryOutcome> {
        let ctx = DeliveryContext {
            retry: self.config.retry,
            handler_timeout: self.config.handler_timeout,
            dead_letters: Arc::clone(&self.dead_letters),
            counters: Arc::clone(&self.counters),
        };
        let guard = InFlightGuard::enter(Arc::clone(&self.counters));
        tokio::spawn(async move {
            let _guard = guard;
            deliver(event, subscription, ctx).await
        })
    }

    /// Dead letters matching `filter`, oldest first.
    pub async fn get_dead_letters(&self, filter: &DeadLetterFilter) -> Vec<DeadLetterEntry> {
        self.dead_letters.list(filter).await
    }

    /// Redeliver a dead-lettered envelope to the subscription it failed on.
    ///
    /// The entry leaves the store; if the delivery fails again a new entry
    /// is created. Fails without touching the entry when the subscription no
    /// longer exists.
    pub async fn requeue_dead_letter(&self, entry_id: Uuid) -> Result<PublishReceipt, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let entry = self
            .dead_letters
            .take(entry_id)
            .await
            .ok_or_else(|| BusError::DeadLetterNotFound(entry_id.to_string()))?;

        let subscription = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .find(|s| s.handle.id == entry.subscription.id)
                .cloned()
        };
        let Some(subscription) = subscription else {
            let missing = entry.subscription.id.to_string();
            self.dead_letters.restore(entry).await;
            return Err(BusError::SubscriptionNotFound(missing));
        };

        tracing::info!(
            entry_id = %entry_id,
            event_id = %entry.event.event_id(),
            agent_id = %entry.subscription.agent_id,
            "requeueing dead letter"
        );

        let event = Arc::new(entry.event);
        let delivery = self.dispatch(Arc::clone(&event), subscription);
        Ok(PublishReceipt {
            event_id: event.event_id(),
            sequence: event.sequence(),
            correlation_id: event.correlation_id(),
            deliveries: vec![delivery],
        })
    }

    /// Remove dead letters matching `filter`; returns how many were removed.
    pub async fn purge_dead_letters(&self, filter: &DeadLetterFilter) -> usize {
        self.dead_letters.purge(filter).await
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Bindings for one event type, in insertion order.
    pub async fn subscriptions_for(&self, event_type: EventType) -> Vec<SubscriptionHandle> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.handle.event_type == event_type)
            .map(|s| s.handle.clone())
            .collect()
    }

    /// Deliveries currently running or waiting for a retry.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed_attempts: self.counters.failed_attempts.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }

    /// Wait until no delivery is in flight. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Refuse further publications and subscriptions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

/// Run one handler invocation, converting timeouts and panics into errors.
async fn invoke(subscription: &Subscription, event: &EventEnvelope, timeout: Duration) -> HandlerResult {
    let call = AssertUnwindSafe(subscription.handler.handle(event)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(HandlerError::Panicked(message))
        }
        Err(_) => Err(HandlerError::Timeout(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

async fn deliver(
    event: Arc<EventEnvelope>,
    subscription: Arc<Subscription>,
    ctx: DeliveryContext,
) -> DeliveryOutcome {
    let mut schedule = ctx.retry.backoff();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let error = match invoke(&subscription, &event, ctx.handler_timeout).await {
            Ok(()) => {
                ctx.counters.delivered.fetch_add(1, Ordering::Relaxed);
                if attempts > 1 {
                    tracing::info!(
                        event_id = %event.event_id(),
                        agent_id = %subscription.handle.agent_id,
                        attempts,
                        "delivery succeeded after retry"
                    );
                }
                return DeliveryOutcome::Delivered { attempts };
            }
            Err(error) => error,
        };

        ctx.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            correlation_id = %event.correlation_id(),
            agent_id = %subscription.handle.agent_id,
            subscription = %subscription.handle.id,
            attempt = attempts,
            max_attempts = ctx.retry.max_attempts(),
            error = %error,
            "handler failed"
        );

        if !ctx.retry.should_retry(attempts) {
            return dead_letter(&event, &subscription, attempts, error.to_string(), &ctx).await;
        }

        let delay = schedule.next_backoff().unwrap_or_else(|| ctx.retry.max_delay());
        tokio::time::sleep(delay).await;

        if !subscription.is_active() {
            let reason = format!("{error} (retry abandoned: subscription removed)");
            return dead_letter(&event, &subscription, attempts, reason, &ctx).await;
        }
    }
}

async fn dead_letter(
    event: &EventEnvelope,
    subscription: &Subscription,
    attempts: u32,
    last_error: String,
    ctx: &DeliveryContext,
) -> DeliveryOutcome {
    let entry = DeadLetterEntry {
        id: Uuid::new_v4(),
        event: event.clone(),
        subscription: subscription.handle.clone(),
        attempts,
        last_error,
        failed_at: Utc::now(),
    };
    let entry_id = entry.id;

    tracing::error!(
        entry_id = %entry_id,
        event_id = %event.event_id(),
        event_type = %event.event_type(),
        correlation_id = %event.correlation_id(),
        agent_id = %subscription.handle.agent_id,
        attempts,
        error = %entry.last_error,
        "delivery dead-lettered"
    );

    ctx.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
    if let Some(evicted) = ctx.dead_letters.push(entry).await {
        tracing::warn!(entry_id = %evicted.id, "dead letter store full, evicted oldest entry");
    }
    DeliveryOutcome::DeadLettered { entry_id, attempts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventPayload, SensorReading};
    use std::sync::atomic::AtomicU32;
    use tokio::time::Instant;

    fn fast_bus(max_attempts: u32) -> EventBus {
        EventBus::new(EventBusConfig {
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(5), Duration::from_millis(50)),
            handler_timeout: Duration::from_millis(200),
            dead_letter_capacity: None,
        })
    }

    fn reading_event() -> EventEnvelope {
        EventEnvelope::new(
            EventPayload::DataReceived(SensorReading::new("s-1", "pump-1", "temperature", 40.0, "C")),
            CorrelationId::new(),
        )
    }

    fn counting(counter: Arc<AtomicU32>) -> Arc<dyn EventHandler> {
        handler_fn(move |_event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn failing(counter: Arc<AtomicU32>) -> Arc<dyn EventHandler> {
        handler_fn(move |_event| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Rejected("always fails".to_string()))
            }
        })
    }

    struct PanickingHandler;

    #[async_trait]
    impl EventHandler for PanickingHandler {
        async fn handle(&self, _event: &EventEnvelope) -> HandlerResult {
            panic!("sensor firmware bug");
        }
    }

    #[tokio::test]
    async fn test_sequence_assignment() {
        let bus = fast_bus(1);
        let first = bus.publish(reading_event()).await.unwrap();
        let second = bus.publish(reading_event()).await.unwrap();
        assert_eq!(first.sequence, SequenceNumber(0));
        assert_eq!(second.sequence, SequenceNumber(1));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_empty_owner() {
        let bus = fast_bus(1);
        let result = bus
            .subscribe(EventType::DataReceived, counting(Arc::new(AtomicU32::new(0))), "  ")
            .await;
        assert!(matches!(result, Err(BusError::InvalidSubscription(_))));
        assert_eq!(bus.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = fast_bus(1);
        let receipt = bus.publish(reading_event()).await.unwrap();
        assert_eq!(receipt.delivery_count(), 0);
        assert_eq!(receipt.wait().await, PublishOutcome::default());
        assert_eq!(bus.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_only_matching_type_is_delivered() {
        let bus = fast_bus(1);
        let received = Arc::new(AtomicU32::new(0));
        let other = Arc::new(AtomicU32::new(0));
        bus.subscribe(EventType::DataReceived, counting(received.clone()), "a").await.unwrap();
        bus.subscribe(EventType::DataProcessed, counting(other.clone()), "b").await.unwrap();

        let outcome = bus.publish(reading_event()).await.unwrap().wait().await;
        assert_eq!(outcome.delivered, 1);
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_creates_second_binding() {
        let bus = fast_bus(1);
        let counter = Arc::new(AtomicU32::new(0));
        let handler = counting(counter.clone());
        bus.subscribe(EventType::DataReceived, handler.clone(), "a").await.unwrap();
        bus.subscribe(EventType::DataReceived, handler, "a").await.unwrap();

        bus.publish(reading_event()).await.unwrap().wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let bus = fast_bus(1);
        let counter = Arc::new(AtomicU32::new(0));
        let handle = bus
            .subscribe(EventType::DataReceived, counting(counter.clone()), "a")
            .await
            .unwrap();
        bus.unsubscribe(&handle).await.unwrap();

        let receipt = bus.publish(reading_event()).await.unwrap();
        assert_eq!(receipt.delivery_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(matches!(
            bus.unsubscribe(&handle).await,
            Err(BusError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_then_dead_letter() {
        let bus = fast_bus(3);
        let calls = Arc::new(AtomicU32::new(0));
        bus.subscribe(EventType::DataReceived, failing(calls.clone()), "flaky").await.unwrap();

        let event = reading_event();
        let event_id = event.event_id();
        let outcome = bus.publish(event).await.unwrap().wait().await;

        assert_eq!(outcome.dead_lettered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let dead = bus.get_dead_letters(&DeadLetterFilter::new()).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].event.event_id(), event_id);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].subscription.agent_id, "flaky");
        assert_eq!(bus.stats().failed_attempts, 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let bus = fast_bus(3);
        let calls = Arc::new(AtomicU32::new(0));
        let handler = {
            let calls = calls.clone();
            handler_fn(move |_event| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HandlerError::Collaborator("store busy".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
        };
        bus.subscribe(EventType::DataReceived, handler, "a").await.unwrap();

        let outcome = bus.publish(reading_event()).await.unwrap().wait().await;
        assert!(outcome.all_delivered());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(bus.get_dead_letters(&DeadLetterFilter::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let bus = EventBus::new(EventBusConfig {
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1)),
            handler_timeout: Duration::from_millis(20),
            dead_letter_capacity: None,
        });
        let handler = handler_fn(|_event| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        bus.subscribe(EventType::DataReceived, handler, "slow").await.unwrap();

        let outcome = bus.publish(reading_event()).await.unwrap().wait().await;
        assert_eq!(outcome.dead_lettered, 1);
        let dead = bus.get_dead_letters(&DeadLetterFilter::new()).await;
        assert_eq!(dead[0].last_error, "handler timed out after 20ms");
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let bus = fast_bus(2);
        let ok_calls = Arc::new(AtomicU32::new(0));
        bus.subscribe(EventType::DataReceived, Arc::new(PanickingHandler), "crashy").await.unwrap();
        bus.subscribe(EventType::DataReceived, counting(ok_calls.clone()), "steady").await.unwrap();

        let outcome = bus.publish(reading_event()).await.unwrap().wait().await;
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.dead_lettered, 1);
        assert_eq!(ok_calls.load(Ordering::SeqCst), 1);

        let dead = bus.get_dead_letters(&DeadLetterFilter::new().agent_id("crashy")).await;
        assert_eq!(dead[0].last_error, "handler panicked: sensor firmware bug");
    }

    #[tokio::test]
    async fn test_pending_retry_abandoned_after_unsubscribe() {
        let bus = EventBus::new(EventBusConfig {
            retry: RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(100)),
            handler_timeout: Duration::from_millis(100),
            dead_letter_capacity: None,
        });
        let calls = Arc::new(AtomicU32::new(0));
        let handle = bus
            .subscribe(EventType::DataReceived, failing(calls.clone()), "leaving")
            .await
            .unwrap();

        let receipt = bus.publish(reading_event()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        bus.unsubscribe(&handle).await.unwrap();

        let outcome = receipt.wait().await;
        assert_eq!(outcome.dead_lettered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let dead = bus.get_dead_letters(&DeadLetterFilter::new()).await;
        assert!(dead[0].last_error.contains("retry abandoned"));
    }

    #[tokio::test]
    async fn test_requeue_redelivers_same_envelope() {
        let bus = fast_bus(1);
        let healthy = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(RwLock::new(Vec::<EventId>::new()));
        let handler = {
            let healthy = healthy.clone();
            let seen = seen.clone();
            handler_fn(move |event: EventEnvelope| {
                let healthy = healthy.clone();
                let seen = seen.clone();
                async move {
                    seen.write().await.push(event.event_id());
                    if healthy.load(Ordering::SeqCst) {
                        Ok(())
                    } else {
                        Err(HandlerError::Collaborator("scheduler offline".to_string()))
                    }
                }
            })
        };
        bus.subscribe(EventType::DataReceived, handler, "scheduling").await.unwrap();
        bus.publish(reading_event()).await.unwrap().wait().await;

        let dead = bus.get_dead_letters(&DeadLetterFilter::new()).await;
        assert_eq!(dead.len(), 1);

        healthy.store(true, Ordering::SeqCst);
        let outcome = bus.requeue_dead_letter(dead[0].id).await.unwrap().wait().await;
        assert!(outcome.all_delivered());
        assert!(bus.get_dead_letters(&DeadLetterFilter::new()).await.is_empty());

        let seen = seen.read().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_requeue_without_subscription_keeps_entry() {
        let bus = fast_bus(1);
        let handle = bus
            .subscribe(EventType::DataReceived, failing(Arc::new(AtomicU32::new(0))), "gone")
            .await
            .unwrap();
        bus.publish(reading_event()).await.unwrap().wait().await;
        bus.unsubscribe(&handle).await.unwrap();

        let dead = bus.get_dead_letters(&DeadLetterFilter::new()).await;
        let result = bus.requeue_dead_letter(dead[0].id).await;
        assert!(matches!(result, Err(BusError::SubscriptionNotFound(_))));
        assert_eq!(bus.get_dead_letters(&DeadLetterFilter::new()).await.len(), 1);

        assert!(matches!(
            bus.requeue_dead_letter(Uuid::new_v4()).await,
            Err(BusError::DeadLetterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_publish() {
        let bus = fast_bus(1);
        bus.close();
        assert!(matches!(bus.publish(reading_event()).await, Err(BusError::Closed)));
        assert!(matches!(
            bus.subscribe(EventType::DataReceived, counting(Arc::new(AtomicU32::new(0))), "a").await,
            Err(BusError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_publish_returns_before_slow_handler_finishes() {
        let bus = fast_bus(1);
        let handler = handler_fn(|_event| async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(())
        });
        bus.subscribe(EventType::DataReceived, handler, "slow").await.unwrap();

        let started = Instant::now();
        let receipt = bus.publish(reading_event()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(bus.in_flight(), 1);

        assert!(bus.wait_idle(Duration::from_secs(2)).await);
        assert_eq!(bus.in_flight(), 0);
        assert!(receipt.wait().await.all_delivered());
    }
}
