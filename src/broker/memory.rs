//! In-Process Broker
//!
//! Topic fan-out to named queues with long-polling receive and visibility
//! timeouts. Publications are wrapped in a notification envelope whose
//! `Message` field holds the original payload as a string.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};
use tracing::debug;
use uuid::Uuid;

use super::{Broker, BrokerError, ReceivedMessage};

/// Default time a received message stays hidden before redelivery.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct Queue {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlight>,
    notify: Arc<Notify>,
}

impl Queue {
    /// Returns messages whose visibility timeout elapsed to the ready list.
    fn restore_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(flight) = self.in_flight.remove(&handle) {
                debug!(message_id = %flight.message.id, "Visibility timeout elapsed, redelivering");
                self.ready.push_back(flight.message);
            }
        }
    }

    fn take(&mut self, max: usize, visibility: Duration, now: Instant) -> Vec<ReceivedMessage> {
        self.restore_expired(now);

        let count = max.min(self.ready.len());
        self.ready
            .drain(..count)
            .map(|message| {
                let ack_handle = Uuid::new_v4().to_string();
                let received = ReceivedMessage {
                    id: message.id.clone(),
                    body: message.body.clone(),
                    ack_handle: ack_handle.clone(),
                };
                self.in_flight.insert(
                    ack_handle,
                    InFlight {
                        message,
                        visible_at: now + visibility,
                    },
                );
                received
            })
            .collect()
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.in_flight.values().map(|flight| flight.visible_at).min()
    }

    fn push(&mut self, message: StoredMessage) {
        self.ready.push_back(message);
        self.notify.notify_waiters();
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, BTreeSet<String>>,
    queues: HashMap<String, Queue>,
}

// == In-Memory Broker ==
/// Broker living inside the process, shared by every replica that holds it.
#[derive(Debug)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    visibility_timeout: Duration,
    available: AtomicBool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

impl InMemoryBroker {
    // == Constructor ==
    /// Creates a broker whose received messages reappear after `visibility_timeout`.
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            visibility_timeout,
            available: AtomicBool::new(true),
        }
    }

    /// Simulates an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Creates `queue` if it does not exist yet.
    pub async fn create_queue(&self, queue: &str) {
        let mut state = self.state.lock().await;
        state.queues.entry(queue.to_string()).or_default();
    }

    /// Places a raw message on `queue`, bypassing topics.
    ///
    /// Enqueuing an id that was already delivered models a broker redelivery.
    pub async fn enqueue(&self, queue: &str, id: &str, body: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        queue_state.push(StoredMessage {
            id: id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    /// Returns `(ready, in_flight)` message counts for `queue`.
    pub async fn depth(&self, queue: &str) -> Option<(usize, usize)> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| (q.ready.len(), q.in_flight.len()))
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("broker is offline".to_string()))
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: &str) -> Result<String, BrokerError> {
        self.ensure_available()?;

        let publication_id = Uuid::new_v4().to_string();
        let envelope = json!({
            "Type": "Notification",
            "MessageId": publication_id,
            "TopicArn": topic,
            "Message": payload,
            "Timestamp": chrono::Utc::now().to_rfc3339(),
        })
        .to_string();

        let mut state = self.state.lock().await;
        let BrokerState { topics, queues } = &mut *state;

        let subscribers = topics.get(topic).cloned().unwrap_or_default();
        for queue in &subscribers {
            if let Some(queue_state) = queues.get_mut(queue) {
                queue_state.push(StoredMessage {
                    id: Uuid::new_v4().to_string(),
                    body: envelope.clone(),
                });
            }
        }

        debug!(
            topic,
            publication_id = %publication_id,
            fanout = subscribers.len(),
            "Published message"
        );
        Ok(publication_id)
    }

    async fn subscribe(&self, topic: &str, queue: &str) -> Result<(), BrokerError> {
        self.ensure_available()?;

        let mut state = self.state.lock().await;
        state.queues.entry(queue.to_string()).or_default();
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(queue.to_string());
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, BrokerError> {
        self.ensure_available()?;

        let deadline = Instant::now() + wait;
        let notify = {
            let state = self.state.lock().await;
            state
                .queues
                .get(queue)
                .map(|q| q.notify.clone())
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?
        };

        loop {
            // Register interest before looking so a publish in between is not missed
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.state.lock().await;
                let queue_state = state
                    .queues
                    .get_mut(queue)
                    .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

                let now = Instant::now();
                let batch = queue_state.take(max_messages, self.visibility_timeout, now);
                if !batch.is_empty() {
                    return Ok(batch);
                }
                if now >= deadline {
                    return Ok(Vec::new());
                }

                queue_state
                    .next_visible_at()
                    .map_or(deadline, |at| at.min(deadline))
            };

            let _ = timeout_at(wake_at, notified).await;
        }
    }

    async fn delete(&self, queue: &str, ack_handle: &str) -> Result<(), BrokerError> {
        self.ensure_available()?;

        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        queue_state
            .in_flight
            .remove(ack_handle)
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownReceipt(ack_handle.to_string()))
    }
}
