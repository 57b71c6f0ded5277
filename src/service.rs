//! Cache Service
//!
//! Public contract used by the HTTP layer. Validates input, applies writes to
//! the store, publishes them, and manages subscription and ingestion.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};

use crate::broker::Broker;
use crate::cache::{CacheKey, CacheStats, Generation, SharedStore};
use crate::error::Result;
use crate::replication::{
    ChangeIngestor, ChangeMessage, ChangePublisher, IngestorConfig, IngestorMetricsSnapshot,
    IngestorState,
};
use crate::seed::SeedSource;

// == Service Config ==
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Topic every replica publishes to and subscribes to
    pub topic: String,
    pub ingestor: IngestorConfig,
}

// == Load Report ==
/// Outcome of `load_initial_cache`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    /// Queue is bound to the change topic
    pub subscribed: bool,
    /// A new ingestor task was spawned by this call
    pub ingestor_started: bool,
    /// Entries written from the seed source
    pub entries_loaded: usize,
}

// == Service Stats ==
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub cache: CacheStats,
    /// Share of reads that found a live value
    pub hit_rate: f64,
    pub ingestor_state: IngestorState,
    pub ingestor: IngestorMetricsSnapshot,
}

// == Cache Service ==
/// Cheap to clone; every clone drives the same store and ingestor.
#[derive(Clone)]
pub struct CacheService {
    store: SharedStore,
    broker: Arc<dyn Broker>,
    publisher: ChangePublisher,
    ingestor: Arc<ChangeIngestor>,
    seed: Arc<dyn SeedSource>,
    ingest_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    shutdown: watch::Receiver<bool>,
}

impl CacheService {
    // == Constructor ==
    /// Wires the service. Nothing is subscribed or spawned until
    /// [`CacheService::load_initial_cache`] runs.
    pub fn new(
        store: SharedStore,
        broker: Arc<dyn Broker>,
        seed: Arc<dyn SeedSource>,
        config: ServiceConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut ingestor_config = config.ingestor;
        ingestor_config.topic = Some(config.topic.clone());

        let publisher = ChangePublisher::new(broker.clone(), config.topic);
        let ingestor = Arc::new(ChangeIngestor::new(
            broker.clone(),
            store.clone(),
            ingestor_config,
        ));

        Self {
            store,
            broker,
            publisher,
            ingestor,
            seed,
            ingest_task: Arc::new(Mutex::new(None)),
            shutdown,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn ingestor(&self) -> &Arc<ChangeIngestor> {
        &self.ingestor
    }

    // == Try Get ==
    /// Looks up a live attribute value. Empty components read as not found.
    pub async fn try_get(
        &self,
        account_code: &str,
        sub_account_code: &str,
        attribute_code: &str,
    ) -> Option<String> {
        let key = CacheKey::new(account_code, sub_account_code, attribute_code);
        if key.has_empty_component() {
            debug!(key = %key, "Lookup with empty key component");
            return None;
        }

        self.store.write().await.get(&key)
    }

    // == Add Or Update ==
    /// Validates, applies locally, then publishes `change`.
    ///
    /// Publish failures are logged by the publisher and do not fail the call.
    pub async fn add_or_update(&self, change: ChangeMessage) -> Result<()> {
        if let Err(error) = change.validate() {
            warn!(%error, "Rejected attribute write");
            return Err(error);
        }

        {
            let mut store = self.store.write().await;
            if tracing::enabled!(Level::DEBUG) {
                debug!(entries = ?store.enumerate(), "Cache before update");
            }
            store.set(change.key(), change.attribute_value.clone());
            if tracing::enabled!(Level::DEBUG) {
                debug!(entries = ?store.enumerate(), "Cache after update");
            }
        }

        self.publisher.publish(&change).await;
        Ok(())
    }

    // == Clear Cache ==
    /// Invalidates every entry by switching generation.
    pub async fn clear_cache(&self) -> Generation {
        let generation = self.store.write().await.invalidate_all();
        info!(generation = %generation, "Cache cleared");
        generation
    }

    // == Reload ==
    /// Writes every valid seed entry into the current generation.
    ///
    /// Seed entries are not published; each replica reloads from the seed itself.
    pub async fn reload(&self) -> Result<usize> {
        let entries = self.seed.load().await?;

        let mut loaded = 0;
        let mut store = self.store.write().await;
        for entry in entries {
            if let Err(error) = entry.validate() {
                warn!(%error, "Skipping invalid seed entry");
                continue;
            }
            store.set(entry.key(), entry.attribute_value);
            loaded += 1;
        }

        info!(loaded, generation = %store.generation(), "Cache reloaded from seed");
        Ok(loaded)
    }

    // == Load Initial Cache ==
    /// Binds this replica's queue to the change topic, makes sure the ingestor
    /// is running, then reloads from the seed.
    ///
    /// Every step is attempted even if an earlier one fails; failures are logged.
    pub async fn load_initial_cache(&self) -> LoadReport {
        let topic = self.publisher.topic();
        let queue = self.ingestor.queue();

        let subscribed = match self.broker.subscribe(topic, queue).await {
            Ok(()) => {
                info!(topic, queue, "Subscribed to change topic");
                true
            }
            Err(error) => {
                error!(topic, queue, %error, "Failed to subscribe to change topic");
                false
            }
        };

        let ingestor_started = self.ensure_ingestor_running().await;

        let entries_loaded = match self.reload().await {
            Ok(count) => count,
            Err(error) => {
                error!(%error, "Failed to reload cache from seed");
                0
            }
        };

        LoadReport {
            subscribed,
            ingestor_started,
            entries_loaded,
        }
    }

    /// Spawns the ingestor loop unless it is already running or shutdown began.
    ///
    /// Returns true if a new task was spawned.
    pub async fn ensure_ingestor_running(&self) -> bool {
        let mut task = self.ingest_task.lock().await;

        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        if *self.shutdown.borrow() {
            return false;
        }

        *task = Some(tokio::spawn(
            self.ingestor.clone().run(self.shutdown.clone()),
        ));
        true
    }

    /// Waits for the ingestor task to exit after shutdown was signalled.
    pub async fn join_ingestor(&self) {
        let handle = self.ingest_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                error!(%error, "Ingestor task ended abnormally");
            }
        }
    }

    // == Entries ==
    /// Live entries keyed by composite key.
    pub async fn entries(&self) -> BTreeMap<String, String> {
        self.store.read().await.enumerate()
    }

    pub async fn stats(&self) -> ServiceStats {
        let cache = self.store.read().await.stats();
        ServiceStats {
            hit_rate: cache.hit_rate(),
            cache,
            ingestor_state: self.ingestor.state(),
            ingestor: self.ingestor.metrics(),
        }
    }
}
