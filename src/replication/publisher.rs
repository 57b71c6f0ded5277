//! Change Publisher
//!
//! Pushes locally applied writes onto the change topic.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::Broker;
use crate::error::Result;
use crate::replication::ChangeMessage;

// == Change Publisher ==
/// Publishes changes to a single topic.
///
/// Failures are logged and never retried; the local write has already happened.
#[derive(Clone)]
pub struct ChangePublisher {
    broker: Arc<dyn Broker>,
    topic: String,
}

impl ChangePublisher {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serializes and publishes `change`, returning the publication id.
    pub async fn try_publish(&self, change: &ChangeMessage) -> Result<String> {
        let payload = change.to_payload()?;
        Ok(self.broker.publish(&self.topic, &payload).await?)
    }

    // == Publish ==
    /// Best-effort publish. Returns the publication id, or `None` after logging a failure.
    pub async fn publish(&self, change: &ChangeMessage) -> Option<String> {
        match self.try_publish(change).await {
            Ok(publication_id) => {
                info!(
                    topic = %self.topic,
                    publication_id = %publication_id,
                    key = %change.key(),
                    "Change published"
                );
                Some(publication_id)
            }
            Err(error) => {
                warn!(
                    topic = %self.topic,
                    key = %change.key(),
                    %error,
                    "Failed to publish change; other replicas may lag until the next refresh"
                );
                None
            }
        }
    }
}
