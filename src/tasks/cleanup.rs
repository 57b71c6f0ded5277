//! Reclamation Task
//!
//! Background task that periodically removes dead cache entries, both those
//! whose sliding window elapsed and those left behind by a generation switch.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedStore;

/// Spawns a background task that periodically reclaims dead cache entries.
///
/// The task sleeps for `cleanup_interval` between sweeps and exits as soon as
/// `shutdown` flips to true. Each sweep takes the store's write lock.
///
/// # Example
/// ```ignore
/// let store = CacheStore::shared(Duration::from_secs(1800));
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let cleanup_handle = spawn_cleanup_task(store.clone(), Duration::from_secs(60), shutdown_rx);
/// // Later, during shutdown:
/// shutdown_tx.send(true).ok();
/// cleanup_handle.await.ok();
/// ```
pub fn spawn_cleanup_task(
    store: SharedStore,
    cleanup_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting reclamation task with interval of {} seconds",
            cleanup_interval.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(cleanup_interval) => {}
            }

            let removed = store.write().await.reclaim();

            if removed > 0 {
                info!("Reclamation: removed {} dead entries", removed);
            } else {
                debug!("Reclamation: no dead entries found");
            }
        }

        info!("Reclamation task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheStore};

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let store = CacheStore::shared(Duration::from_millis(200));
        store
            .write()
            .await
            .set(CacheKey::new("1", "2", "expiring"), "v".to_string());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_cleanup_task(store.clone(), Duration::from_millis(100), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.read().await.is_empty(), "Expired entry should be reclaimed");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_stale_generation() {
        let store = CacheStore::shared(Duration::from_secs(3600));
        {
            let mut cache = store.write().await;
            cache.set(CacheKey::new("1", "2", "old"), "v".to_string());
            cache.invalidate_all();
            cache.set(CacheKey::new("1", "2", "new"), "v".to_string());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_cleanup_task(store.clone(), Duration::from_millis(50), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        {
            let mut cache = store.write().await;
            assert_eq!(cache.len(), 1);
            assert!(cache.get(&CacheKey::new("1", "2", "new")).is_some());
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let store = CacheStore::shared(Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_cleanup_task(store, Duration::from_secs(3600), shutdown_rx);
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("Task should stop without waiting out its interval")
            .unwrap();
    }
}
