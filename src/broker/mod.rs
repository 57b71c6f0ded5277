//! Broker Module
//!
//! Contract for the publish/subscribe transport that carries change messages
//! between replicas, plus an in-process implementation.
//!
//! Delivery is at-least-once: a received message stays owned by the broker
//! until it is deleted with its ack handle, and may be delivered again.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryBroker;

// == Broker Error ==
/// Transport failures reported by a broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker cannot be reached or refused the call
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Queue address is not known to the broker
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// Ack handle does not match an in-flight message
    #[error("Unknown ack handle: {0}")]
    UnknownReceipt(String),
}

// == Received Message ==
/// One delivery of a message taken from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Stable message identifier, identical across redeliveries
    pub id: String,
    /// Raw message body
    pub body: String,
    /// Handle used to delete this particular delivery
    pub ack_handle: String,
}

// == Broker Trait ==
/// Publish/subscribe transport.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes `payload` to every queue subscribed to `topic`.
    ///
    /// Returns the broker-assigned publication id.
    async fn publish(&self, topic: &str, payload: &str) -> Result<String, BrokerError>;

    /// Binds `queue` to `topic`. Binding twice is a no-op.
    async fn subscribe(&self, topic: &str, queue: &str) -> Result<(), BrokerError>;

    /// Takes up to `max_messages` from `queue`, waiting up to `wait` for the
    /// first one to arrive. An empty result means the wait elapsed.
    async fn receive(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, BrokerError>;

    /// Removes a received message so it is not delivered again.
    async fn delete(&self, queue: &str, ack_handle: &str) -> Result<(), BrokerError>;
}
