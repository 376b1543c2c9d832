//! Bridge lifecycle events
//!
//! Publish-subscribe channel the orchestrator and reducers report into.
//! Subscribers run synchronously on the publishing task, so they must not block.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{BridgeState, TransactionType};

/// Bridge lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A driver started for the transaction
    TransactionStarted {
        tx_id: String,
        kind: TransactionType,
        state: BridgeState,
        timestamp: DateTime<Utc>,
    },

    /// One step persisted a new state
    StateChanged {
        tx_id: String,
        from: BridgeState,
        to: BridgeState,
        timestamp: DateTime<Utc>,
    },

    /// A step failed and was routed to its reject state
    StepRejected {
        tx_id: String,
        state: BridgeState,
        reject_state: BridgeState,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Reached the done state
    TransactionCompleted {
        tx_id: String,
        kind: TransactionType,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Reached a failed state
    TransactionFailed {
        tx_id: String,
        kind: TransactionType,
        state: BridgeState,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Driver stopped on an unclassified error, state left as persisted
    DriverError {
        tx_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl BridgeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BridgeEvent::TransactionStarted { .. } => "transaction_started",
            BridgeEvent::StateChanged { .. } => "state_changed",
            BridgeEvent::StepRejected { .. } => "step_rejected",
            BridgeEvent::TransactionCompleted { .. } => "transaction_completed",
            BridgeEvent::TransactionFailed { .. } => "transaction_failed",
            BridgeEvent::DriverError { .. } => "driver_error",
        }
    }

    pub fn tx_id(&self) -> &str {
        match self {
            BridgeEvent::TransactionStarted { tx_id, .. }
            | BridgeEvent::StateChanged { tx_id, .. }
            | BridgeEvent::StepRejected { tx_id, .. }
            | BridgeEvent::TransactionCompleted { tx_id, .. }
            | BridgeEvent::TransactionFailed { tx_id, .. }
            | BridgeEvent::DriverError { tx_id, .. } => tx_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BridgeEvent::TransactionStarted { timestamp, .. }
            | BridgeEvent::StateChanged { timestamp, .. }
            | BridgeEvent::StepRejected { timestamp, .. }
            | BridgeEvent::TransactionCompleted { timestamp, .. }
            | BridgeEvent::TransactionFailed { timestamp, .. }
            | BridgeEvent::DriverError { timestamp, .. } => *timestamp,
        }
    }
}

/// Event subscriber
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &BridgeEvent);

    fn name(&self) -> &str;

    /// Event types to receive; empty means all.
    fn interested_events(&self) -> Vec<&'static str>;
}

/// Event bus with a bounded history of recent events.
pub struct EventBus {
    subscribers: Mutex<Vec<Arc<dyn EventSubscriber>>>,
    event_buffer: Mutex<VecDeque<BridgeEvent>>,
    buffer_size: usize,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            event_buffer: Mutex::new(VecDeque::with_capacity(buffer_size)),
            buffer_size,
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    pub fn unsubscribe(&self, subscriber_name: &str) {
        self.subscribers.lock().retain(|s| s.name() != subscriber_name);
    }

    pub fn publish(&self, event: BridgeEvent) {
        if self.buffer_size > 0 {
            let mut buffer = self.event_buffer.lock();
            if buffer.len() >= self.buffer_size {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }

        // Snapshot so a subscriber may (un)subscribe from its callback
        let subs: Vec<_> = self.subscribers.lock().clone();
        for subscriber in subs {
            let interested = subscriber.interested_events();
            if interested.is_empty() || interested.contains(&event.event_type()) {
                subscriber.on_event(&event);
            }
        }
    }

    pub fn get_recent_events(&self, count: usize) -> Vec<BridgeEvent> {
        let buffer = self.event_buffer.lock();
        let start = buffer.len().saturating_sub(count);
        buffer.iter().skip(start).cloned().collect()
    }

    /// Recent events of one transaction, oldest first.
    pub fn events_for(&self, tx_id: &str) -> Vec<BridgeEvent> {
        self.event_buffer.lock().iter().filter(|e| e.tx_id() == tx_id).cloned().collect()
    }

    pub fn clear_buffer(&self) {
        self.event_buffer.lock().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Logs events through `tracing`.
pub struct LoggingSubscriber {
    name: String,
}

impl LoggingSubscriber {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &BridgeEvent) {
        use tracing::{debug, error, info, warn};

        match event {
            BridgeEvent::TransactionStarted { tx_id, kind, state, .. } => {
                info!(tx_id = %tx_id, kind = %kind, state = %state, "Bridge transaction driver started");
            }
            BridgeEvent::StateChanged { tx_id, from, to, .. } => {
                debug!(tx_id = %tx_id, from = %from, to = %to, "Bridge transaction state changed");
            }
            BridgeEvent::StepRejected { tx_id, state, reject_state, error, .. } => {
                warn!(
                    tx_id = %tx_id,
                    state = %state,
                    reject_state = %reject_state,
                    error = %error,
                    "Bridge step rejected"
                );
            }
            BridgeEvent::TransactionCompleted { tx_id, kind, duration_ms, .. } => {
                info!(tx_id = %tx_id, kind = %kind, duration_ms = duration_ms, "Bridge transaction completed");
            }
            BridgeEvent::TransactionFailed { tx_id, kind, state, error, .. } => {
                warn!(
                    tx_id = %tx_id,
                    kind = %kind,
                    state = %state,
                    error = ?error,
                    "Bridge transaction failed"
                );
            }
            BridgeEvent::DriverError { tx_id, error, .. } => {
                error!(tx_id = %tx_id, error = %error, "Bridge transaction driver stopped");
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn interested_events(&self) -> Vec<&'static str> {
        vec![]
    }
}

/// Counts lifecycle outcomes.
pub struct StatisticsSubscriber {
    name: String,
    stats: Mutex<BridgeStatistics>,
}

impl StatisticsSubscriber {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), stats: Mutex::new(BridgeStatistics::default()) }
    }

    pub fn get_statistics(&self) -> BridgeStatistics {
        self.stats.lock().clone()
    }

    pub fn reset_statistics(&self) {
        *self.stats.lock() = BridgeStatistics::default();
    }
}

impl EventSubscriber for StatisticsSubscriber {
    fn on_event(&self, event: &BridgeEvent) {
        let mut stats = self.stats.lock();

        match event {
            BridgeEvent::TransactionStarted { .. } => stats.started += 1,
            BridgeEvent::StateChanged { .. } => stats.state_changes += 1,
            BridgeEvent::StepRejected { .. } => stats.step_rejections += 1,
            BridgeEvent::TransactionCompleted { duration_ms, .. } => {
                stats.completed += 1;
                stats.total_duration_ms += duration_ms;
            }
            BridgeEvent::TransactionFailed { .. } => stats.failed += 1,
            BridgeEvent::DriverError { .. } => stats.driver_errors += 1,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn interested_events(&self) -> Vec<&'static str> {
        vec![]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStatistics {
    pub started: u64,
    pub state_changes: u64,
    pub step_rejections: u64,
    pub completed: u64,
    pub failed: u64,
    pub driver_errors: u64,
    pub total_duration_ms: u64,
}

impl BridgeStatistics {
    pub fn average_duration_ms(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.completed as f64
        }
    }

    /// Share of finished transactions that failed.
    pub fn failure_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            0.0
        } else {
            self.failed as f64 / finished as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started(id: &str) -> BridgeEvent {
        BridgeEvent::TransactionStarted {
            tx_id: id.to_string(),
            kind: TransactionType::EvmOutgoing,
            state: BridgeState::Initial,
            timestamp: Utc::now(),
        }
    }

    struct CountingSubscriber {
        count: Arc<AtomicUsize>,
        only: Vec<&'static str>,
    }

    impl EventSubscriber for CountingSubscriber {
        fn on_event(&self, _event: &BridgeEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn interested_events(&self) -> Vec<&'static str> {
            self.only.clone()
        }
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(10);
        let all = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: all.clone(), only: vec![] }));
        bus.subscribe(Arc::new(CountingSubscriber {
            count: failures.clone(),
            only: vec!["transaction_failed"],
        }));

        bus.publish(started("a"));
        bus.publish(BridgeEvent::TransactionFailed {
            tx_id: "a".to_string(),
            kind: TransactionType::EvmOutgoing,
            state: BridgeState::SoraRejected,
            error: Some("declined".to_string()),
            timestamp: Utc::now(),
        });

        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let bus = EventBus::new(3);
        for i in 0..5 {
            bus.publish(started(&format!("tx{}", i)));
        }
        let recent = bus.get_recent_events(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].tx_id(), "tx2");
        assert_eq!(bus.events_for("tx4").len(), 1);
        assert!(bus.events_for("tx0").is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone(), only: vec![] }));
        bus.unsubscribe("counting");
        bus.publish(started("a"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_statistics_subscriber() {
        let subscriber = StatisticsSubscriber::new("stats");
        subscriber.on_event(&started("a"));
        subscriber.on_event(&BridgeEvent::TransactionCompleted {
            tx_id: "a".to_string(),
            kind: TransactionType::EvmOutgoing,
            duration_ms: 40,
            timestamp: Utc::now(),
        });
        subscriber.on_event(&BridgeEvent::TransactionFailed {
            tx_id: "b".to_string(),
            kind: TransactionType::EvmIncoming,
            state: BridgeState::ExternalRejected,
            error: None,
            timestamp: Utc::now(),
        });

        let stats = subscriber.get_statistics();
        assert_eq!(stats.started, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.average_duration_ms(), 40.0);
        assert_eq!(stats.failure_rate(), 0.5);

        subscriber.reset_statistics();
        assert_eq!(subscriber.get_statistics(), BridgeStatistics::default());
    }
}
