//! Replication Module
//!
//! Keeps replicas converged: local writes go out through the publisher, remote
//! writes come in through the ingestor.

mod backoff;
mod ingestor;
mod message;
mod processed;
mod publisher;

pub use backoff::ExponentialBackoff;
pub use ingestor::{
    BatchSummary, ChangeIngestor, IngestorConfig, IngestorMetrics, IngestorMetricsSnapshot,
    IngestorState, DEFAULT_MAX_MESSAGES, DEFAULT_WAIT,
};
pub use message::ChangeMessage;
pub use processed::ProcessedMessages;
pub use publisher::ChangePublisher;
