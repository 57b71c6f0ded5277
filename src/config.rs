//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use uuid::Uuid;

use crate::cache::DEFAULT_SLIDING_WINDOW_SECS;
use crate::replication::{ExponentialBackoff, IngestorConfig};
use crate::service::ServiceConfig;
use crate::tasks::RefreshSchedule;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Idle time after which an entry expires, in seconds
    pub sliding_expiration: u64,
    /// Reclamation sweep interval in seconds
    pub cleanup_interval: u64,
    /// Topic carrying attribute changes between replicas
    pub change_topic: String,
    /// This replica's inbound queue
    pub instance_queue: String,
    /// Messages requested per receive call
    pub receive_max_messages: usize,
    /// Long-poll window in seconds
    pub receive_wait: u64,
    /// Redelivery delay of the in-process broker, in seconds
    pub visibility_timeout: u64,
    /// Maximum remembered message ids
    pub dedupe_capacity: usize,
    /// Message id retention in seconds
    pub dedupe_ttl: u64,
    /// First retry delay after a failed receive, in milliseconds
    pub backoff_initial_ms: u64,
    /// Retry delay ceiling, in milliseconds
    pub backoff_max_ms: u64,
    /// Local wall-clock time of the daily refresh
    pub refresh_at: NaiveTime,
    /// Rolling refresh interval in seconds; overrides `refresh_at` when set
    pub refresh_interval: Option<u64>,
    /// JSON file holding the authoritative entries
    pub seed_file: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SLIDING_EXPIRATION_SECS` - Entry idle timeout (default: 1800)
    /// - `CLEANUP_INTERVAL` - Reclamation frequency in seconds (default: 60)
    /// - `CHANGE_TOPIC` - Change topic name (default: attribute-changes)
    /// - `INSTANCE_QUEUE` - Inbound queue name (default: attribute-cache-<uuid>)
    /// - `RECEIVE_MAX_MESSAGES` - Messages per receive (default: 10)
    /// - `RECEIVE_WAIT_SECS` - Long-poll window (default: 20)
    /// - `VISIBILITY_TIMEOUT_SECS` - Redelivery delay (default: 30)
    /// - `DEDUPE_CAPACITY` - Remembered message ids (default: 10000)
    /// - `DEDUPE_TTL_SECS` - Message id retention (default: 3600)
    /// - `BACKOFF_INITIAL_MS` / `BACKOFF_MAX_MS` - Receive retry delays (default: 500 / 30000)
    /// - `REFRESH_AT` - Daily refresh time as HH:MM (default: 08:00)
    /// - `REFRESH_INTERVAL_SECS` - Rolling refresh interval (default: unset)
    /// - `SEED_FILE` - Seed JSON file (default: unset, built-in entries)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            sliding_expiration: env_or("SLIDING_EXPIRATION_SECS", defaults.sliding_expiration),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            change_topic: env::var("CHANGE_TOPIC").unwrap_or(defaults.change_topic),
            instance_queue: env::var("INSTANCE_QUEUE").unwrap_or(defaults.instance_queue),
            receive_max_messages: env_or("RECEIVE_MAX_MESSAGES", defaults.receive_max_messages),
            receive_wait: env_or("RECEIVE_WAIT_SECS", defaults.receive_wait),
            visibility_timeout: env_or("VISIBILITY_TIMEOUT_SECS", defaults.visibility_timeout),
            dedupe_capacity: env_or("DEDUPE_CAPACITY", defaults.dedupe_capacity),
            dedupe_ttl: env_or("DEDUPE_TTL_SECS", defaults.dedupe_ttl),
            backoff_initial_ms: env_or("BACKOFF_INITIAL_MS", defaults.backoff_initial_ms),
            backoff_max_ms: env_or("BACKOFF_MAX_MS", defaults.backoff_max_ms),
            refresh_at: env::var("REFRESH_AT")
                .ok()
                .and_then(|v| NaiveTime::parse_from_str(&v, "%H:%M").ok())
                .unwrap_or(defaults.refresh_at),
            refresh_interval: env::var("REFRESH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0),
            seed_file: env::var("SEED_FILE").ok().map(PathBuf::from),
        }
    }

    /// Sliding expiration as a Duration.
    pub fn sliding_window(&self) -> Duration {
        Duration::from_secs(self.sliding_expiration)
    }

    pub fn refresh_schedule(&self) -> RefreshSchedule {
        match self.refresh_interval {
            Some(secs) => RefreshSchedule::Every(Duration::from_secs(secs)),
            None => RefreshSchedule::DailyAt(self.refresh_at),
        }
    }

    /// Settings for the cache service and its ingestor.
    ///
    /// Receive batch size and long-poll window are at least 1 so the ingestor
    /// always suspends between polls.
    pub fn service_config(&self) -> ServiceConfig {
        let mut ingestor = IngestorConfig::new(self.instance_queue.clone());
        ingestor.max_messages = self.receive_max_messages.max(1);
        ingestor.wait = Duration::from_secs(self.receive_wait.max(1));
        ingestor.dedupe_capacity = self.dedupe_capacity;
        ingestor.dedupe_retention = Duration::from_secs(self.dedupe_ttl);
        ingestor.backoff = ExponentialBackoff::new(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
        );

        ServiceConfig {
            topic: self.change_topic.clone(),
            ingestor,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            sliding_expiration: DEFAULT_SLIDING_WINDOW_SECS,
            cleanup_interval: 60,
            change_topic: "attribute-changes".to_string(),
            instance_queue: format!("attribute-cache-{}", Uuid::new_v4()),
            receive_max_messages: 10,
            receive_wait: 20,
            visibility_timeout: 30,
            dedupe_capacity: 10_000,
            dedupe_ttl: 3600,
            backoff_initial_ms: 500,
            backoff_max_ms: 30_000,
            refresh_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            refresh_interval: None,
            seed_file: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
