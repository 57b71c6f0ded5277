//! Change Ingestor
//!
//! Long-polls this replica's queue and applies remote changes to the store.
//!
//! Each cycle moves through `Polling -> Processing -> Acknowledging`. Every
//! delivered message is acknowledged once handled, including duplicates and
//! malformed bodies, so a bad message cannot be redelivered forever.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerError, ReceivedMessage};
use crate::cache::SharedStore;
use crate::replication::{ChangeMessage, ExponentialBackoff, ProcessedMessages};

/// Messages requested per receive call.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Long-poll window per receive call.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(20);

// == Ingestor Config ==
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Queue this replica receives from
    pub queue: String,
    pub max_messages: usize,
    pub wait: Duration,
    /// Delay schedule after failed receive calls
    pub backoff: ExponentialBackoff,
    /// Maximum number of remembered message ids
    pub dedupe_capacity: usize,
    /// How long a message id is remembered
    pub dedupe_retention: Duration,
    /// Topic the queue is bound to again if the broker reports it missing
    pub topic: Option<String>,
}

impl IngestorConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            max_messages: DEFAULT_MAX_MESSAGES,
            wait: DEFAULT_WAIT,
            backoff: ExponentialBackoff::default(),
            dedupe_capacity: 10_000,
            dedupe_retention: Duration::from_secs(3600),
            topic: None,
        }
    }
}

// == Ingestor State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestorState {
    Idle,
    Polling,
    Processing,
    Acknowledging,
    Stopped,
}

impl IngestorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => IngestorState::Polling,
            2 => IngestorState::Processing,
            3 => IngestorState::Acknowledging,
            4 => IngestorState::Stopped,
            _ => IngestorState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            IngestorState::Idle => 0,
            IngestorState::Polling => 1,
            IngestorState::Processing => 2,
            IngestorState::Acknowledging => 3,
            IngestorState::Stopped => 4,
        }
    }
}

// == Metrics ==
/// Counters updated by the ingestor loop.
#[derive(Debug, Default)]
pub struct IngestorMetrics {
    pub received: AtomicU64,
    pub applied: AtomicU64,
    pub duplicates: AtomicU64,
    pub malformed: AtomicU64,
    pub rejected: AtomicU64,
    pub ack_failures: AtomicU64,
    pub receive_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestorMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestorMetricsSnapshot {
    pub received: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub rejected: u64,
    pub ack_failures: u64,
    pub receive_failures: u64,
}

impl IngestorMetrics {
    pub fn snapshot(&self) -> IngestorMetricsSnapshot {
        IngestorMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            receive_failures: self.receive_failures.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one message in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Applied,
    Duplicate,
    Malformed,
    Rejected,
}

/// Per-batch outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub rejected: usize,
}

impl BatchSummary {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Applied => self.applied += 1,
            Disposition::Duplicate => self.duplicates += 1,
            Disposition::Malformed => self.malformed += 1,
            Disposition::Rejected => self.rejected += 1,
        }
    }
}

// == Change Ingestor ==
pub struct ChangeIngestor {
    broker: Arc<dyn Broker>,
    store: SharedStore,
    config: IngestorConfig,
    processed: Mutex<ProcessedMessages>,
    metrics: IngestorMetrics,
    state: AtomicU8,
}

impl ChangeIngestor {
    // == Constructor ==
    pub fn new(broker: Arc<dyn Broker>, store: SharedStore, config: IngestorConfig) -> Self {
        let processed = ProcessedMessages::new(config.dedupe_capacity, config.dedupe_retention);
        Self {
            broker,
            store,
            config,
            processed: Mutex::new(processed),
            metrics: IngestorMetrics::default(),
            state: AtomicU8::new(IngestorState::Idle.as_u8()),
        }
    }

    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    pub fn state(&self) -> IngestorState {
        IngestorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: IngestorState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn metrics(&self) -> IngestorMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Binds the queue to the configured topic again after a failed subscribe.
    async fn resubscribe(&self) {
        let Some(topic) = self.config.topic.as_deref() else {
            return;
        };

        match self.broker.subscribe(topic, &self.config.queue).await {
            Ok(()) => info!(topic, queue = %self.config.queue, "Resubscribed to change topic"),
            Err(error) => warn!(topic, queue = %self.config.queue, %error, "Resubscribe failed"),
        }
    }

    /// Number of changes written to the store so far.
    pub fn applied_count(&self) -> u64 {
        self.metrics.applied.load(Ordering::Relaxed)
    }

    // == Run ==
    /// Polls until `shutdown` flips to true or its sender is dropped.
    ///
    /// Receive failures never end the loop; they back off exponentially and
    /// the delay resets after the next successful receive.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.config.queue,
            max_messages = self.config.max_messages,
            wait_secs = self.config.wait.as_secs(),
            "Change ingestor started"
        );

        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(IngestorState::Polling);
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.broker.receive(
                    &self.config.queue,
                    self.config.max_messages,
                    self.config.wait,
                ) => result,
            };

            match received {
                Ok(messages) => {
                    failures = 0;
                    if messages.is_empty() {
                        debug!(queue = %self.config.queue, "Long poll returned no messages");
                    } else {
                        self.process_batch(messages).await;
                    }
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    self.metrics.receive_failures.fetch_add(1, Ordering::Relaxed);
                    let delay = self.config.backoff.delay_for_attempt(failures);
                    warn!(
                        queue = %self.config.queue,
                        %error,
                        consecutive_failures = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        "Receive failed, backing off"
                    );

                    if matches!(error, BrokerError::QueueNotFound(_)) {
                        self.resubscribe().await;
                    }

                    self.set_state(IngestorState::Idle);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(IngestorState::Stopped);
        info!(queue = %self.config.queue, "Change ingestor stopped");
    }

    // == Process Batch ==
    /// Applies a received batch, then acknowledges every message in it.
    pub async fn process_batch(&self, messages: Vec<ReceivedMessage>) -> BatchSummary {
        self.set_state(IngestorState::Processing);

        let mut summary = BatchSummary::default();
        let mut seen_in_batch: HashSet<&str> = HashSet::new();

        for message in &messages {
            self.metrics.received.fetch_add(1, Ordering::Relaxed);

            let disposition = if !seen_in_batch.insert(message.id.as_str()) {
                Disposition::Duplicate
            } else {
                self.handle(message).await
            };

            let counter = match disposition {
                Disposition::Applied => &self.metrics.applied,
                Disposition::Duplicate => &self.metrics.duplicates,
                Disposition::Malformed => &self.metrics.malformed,
                Disposition::Rejected => &self.metrics.rejected,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            summary.record(disposition);
        }

        self.set_state(IngestorState::Acknowledging);
        self.acknowledge(&messages).await;

        debug!(
            queue = %self.config.queue,
            applied = summary.applied,
            duplicates = summary.duplicates,
            malformed = summary.malformed,
            rejected = summary.rejected,
            "Batch processed"
        );
        summary
    }

    async fn handle(&self, message: &ReceivedMessage) -> Disposition {
        if self
            .processed
            .lock()
            .await
            .contains(&message.id, Instant::now())
        {
            debug!(message_id = %message.id, "Skipping already processed message");
            return Disposition::Duplicate;
        }

        let change = match ChangeMessage::from_envelope(&message.body) {
            Ok(change) => change,
            Err(error) => {
                warn!(message_id = %message.id, %error, "Discarding malformed change message");
                return Disposition::Malformed;
            }
        };

        if let Err(error) = change.validate() {
            warn!(message_id = %message.id, %error, "Discarding invalid change message");
            return Disposition::Rejected;
        }

        let key = change.key();
        debug!(message_id = %message.id, key = %key, "Applying remote change");
        self.store.write().await.set(key, change.attribute_value);
        Disposition::Applied
    }

    // == Acknowledge ==
    /// Deletes each message from the queue and records its id as processed.
    ///
    /// The id is recorded even when the delete fails, so a redelivery is a no-op.
    async fn acknowledge(&self, messages: &[ReceivedMessage]) {
        for message in messages {
            if let Err(error) = self
                .broker
                .delete(&self.config.queue, &message.ack_handle)
                .await
            {
                self.metrics.ack_failures.fetch_add(1, Ordering::Relaxed);
                warn!(message_id = %message.id, %error, "Failed to acknowledge message");
            }

            self.processed
                .lock()
                .await
                .insert(&message.id, Instant::now());
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::cache::{CacheKey, CacheStore};
    use serde_json::json;

    const QUEUE: &str = "replica-a";

    fn envelope(change: &ChangeMessage) -> String {
        json!({ "Type": "Notification", "Message": change.to_payload().unwrap() }).to_string()
    }

    fn delivery(id: &str, body: String) -> ReceivedMessage {
        ReceivedMessage {
            id: id.to_string(),
            body,
            ack_handle: format!("ack-{}", id),
        }
    }

    async fn setup() -> (Arc<InMemoryBroker>, SharedStore, Arc<ChangeIngestor>) {
        let broker = Arc::new(InMemoryBroker::default());
        broker.create_queue(QUEUE).await;
        let store = CacheStore::shared(Duration::from_secs(1800));
        let mut config = IngestorConfig::new(QUEUE);
        config.wait = Duration::from_millis(50);
        config.backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(40));
        let ingestor = Arc::new(ChangeIngestor::new(broker.clone(), store.clone(), config));
        (broker, store, ingestor)
    }

    #[tokio::test]
    async fn test_batch_applies_changes() {
        let (_, store, ingestor) = setup().await;
        let change = ChangeMessage::new("123", "001", "color", "blue");

        let summary = ingestor
            .process_batch(vec![delivery("m-1", envelope(&change))])
            .await;

        assert_eq!(summary.applied, 1);
        assert_eq!(
            store.write().await.get(&CacheKey::new("123", "001", "color")),
            Some("blue".to_string())
        );
        assert_eq!(ingestor.applied_count(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_message_is_a_noop() {
        let (_, store, ingestor) = setup().await;
        let change = ChangeMessage::new("123", "001", "color", "blue");

        ingestor
            .process_batch(vec![delivery("m-1", envelope(&change))])
            .await;

        // A local write lands between the two deliveries
        store
            .write()
            .await
            .set(CacheKey::new("123", "001", "color"), "red".to_string());

        let summary = ingestor
            .process_batch(vec![delivery("m-1", envelope(&change))])
            .await;

        assert_eq!(summary.duplicates, 1);
        assert_eq!(ingestor.applied_count(), 1);
        assert_eq!(
            store.write().await.get(&CacheKey::new("123", "001", "color")),
            Some("red".to_string())
        );
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch_applies_once() {
        let (_, _, ingestor) = setup().await;
        let change = ChangeMessage::new("123", "001", "color", "blue");

        let summary = ingestor
            .process_batch(vec![
                delivery("m-1", envelope(&change)),
                delivery("m-1", envelope(&change)),
            ])
            .await;

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[tokio::test]
    async fn test_malformed_message_is_counted_and_skipped() {
        let (_, store, ingestor) = setup().await;

        let summary = ingestor
            .process_batch(vec![
                delivery("m-1", "not json".to_string()),
                delivery("m-2", json!({ "Message": "{}" }).to_string()),
            ])
            .await;

        assert_eq!(summary.malformed, 2);
        assert!(store.read().await.is_empty());
        assert_eq!(ingestor.metrics().malformed, 2);
    }

    #[tokio::test]
    async fn test_invalid_change_is_rejected() {
        let (_, store, ingestor) = setup().await;
        let change = ChangeMessage::new("", "001", "color", "blue");

        let summary = ingestor
            .process_batch(vec![delivery("m-1", envelope(&change))])
            .await;

        assert_eq!(summary.rejected, 1);
        assert!(store.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_leaves_ingestor_acknowledging() {
        let (_, _, ingestor) = setup().await;
        assert_eq!(ingestor.state(), IngestorState::Idle);

        ingestor.process_batch(vec![]).await;
        assert_eq!(ingestor.state(), IngestorState::Acknowledging);
    }

    #[tokio::test]
    async fn test_run_acknowledges_malformed_messages() {
        let (broker, _, ingestor) = setup().await;
        broker.enqueue(QUEUE, "m-1", "garbage").await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(ingestor.clone().run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(broker.depth(QUEUE).await, Some((0, 0)), "Poison message must be deleted");
        assert_eq!(ingestor.metrics().malformed, 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_survives_receive_failures() {
        let (broker, store, ingestor) = setup().await;
        broker.set_available(false);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(ingestor.clone().run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ingestor.metrics().receive_failures >= 2);
        assert!(!handle.is_finished());

        broker.set_available(true);
        let change = ChangeMessage::new("123", "001", "color", "blue");
        broker.enqueue(QUEUE, "m-1", &envelope(&change)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.write().await.get(&CacheKey::new("123", "001", "color")),
            Some("blue".to_string())
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_resubscribes_missing_queue() {
        let broker = Arc::new(InMemoryBroker::default());
        let store = CacheStore::shared(Duration::from_secs(1800));
        let mut config = IngestorConfig::new(QUEUE);
        config.wait = Duration::from_millis(50);
        config.backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(40));
        config.topic = Some("changes".to_string());
        let ingestor = Arc::new(ChangeIngestor::new(broker.clone(), store.clone(), config));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(ingestor.clone().run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ingestor.metrics().receive_failures >= 1);
        assert!(broker.depth(QUEUE).await.is_some(), "Queue should be bound again");

        let change = ChangeMessage::new("123", "001", "color", "blue");
        broker
            .publish("changes", &change.to_payload().unwrap())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.write().await.get(&CacheKey::new("123", "001", "color")),
            Some("blue".to_string())
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_promptly_on_shutdown() {
        let (broker, _, _) = setup().await;
        let mut config = IngestorConfig::new(QUEUE);
        config.wait = Duration::from_secs(20);
        let store = CacheStore::shared(Duration::from_secs(1800));
        let ingestor = Arc::new(ChangeIngestor::new(broker, store, config));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(ingestor.clone().run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ingestor.state(), IngestorState::Polling);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Ingestor should not wait out the long poll")
            .unwrap();
        assert_eq!(ingestor.state(), IngestorState::Stopped);
    }
}
