//! Cache Store Module
//!
//! Generation-tagged attribute table with sliding expiration.
//!
//! Bulk invalidation never touches individual entries: `invalidate_all` only
//! advances the store's generation, and every read compares the entry's tag
//! against it. Dead entries stay resident until `reclaim` sweeps them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::cache::{CacheEntry, CacheKey, CacheStats, Generation};

/// Store handle shared by the HTTP path, the ingestor and the background tasks.
pub type SharedStore = Arc<RwLock<CacheStore>>;

// == Cache Store ==
/// In-memory attribute storage.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage; its keys double as the enumeration index
    entries: HashMap<CacheKey, CacheEntry>,
    /// Live generation
    generation: Generation,
    /// Idle time after which an entry expires
    sliding_window: Duration,
    /// Performance statistics
    stats: CacheStats,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store whose entries expire after `sliding_window` idle time.
    pub fn new(sliding_window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            generation: Generation::INITIAL,
            sliding_window,
            stats: CacheStats::new(),
        }
    }

    /// Wraps a new store for sharing across tasks.
    pub fn shared(sliding_window: Duration) -> SharedStore {
        Arc::new(RwLock::new(Self::new(sliding_window)))
    }

    // == Set ==
    /// Inserts or overwrites `key` in the current generation.
    ///
    /// The sliding window restarts and the entry gets high priority. Keys are
    /// not validated here.
    pub fn set(&mut self, key: CacheKey, value: String) {
        let entry = CacheEntry::new(value, self.generation, self.sliding_window);
        self.entries.insert(key, entry);
        self.stats.record_write();
    }

    // == Get ==
    /// Returns the value for `key` if it is live, restarting its sliding window.
    ///
    /// Expired or stale entries read as absent and are dropped on the spot.
    pub fn get(&mut self, key: &CacheKey) -> Option<String> {
        let now = Instant::now();
        let generation = self.generation;

        match self.entries.get_mut(key) {
            Some(entry) if entry.is_live_at(generation, now) => {
                entry.touch(now);
                let value = entry.value.clone();
                self.stats.record_hit();
                Some(value)
            }
            Some(_) => {
                self.entries.remove(key);
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Invalidate All ==
    /// Moves the store to a new generation, making every existing entry dead.
    ///
    /// Constant time: no entry is visited.
    pub fn invalidate_all(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.stats.record_invalidation(self.generation);
        self.generation
    }

    // == Enumerate ==
    /// Returns every live entry keyed by its composite key string.
    ///
    /// Does not refresh sliding windows.
    pub fn enumerate(&self) -> BTreeMap<String, String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_live_at(self.generation, now))
            .map(|(key, entry)| (key.as_str().to_string(), entry.value.clone()))
            .collect()
    }

    // == Reclaim ==
    /// Removes every expired or stale entry.
    ///
    /// Returns the number of entries removed.
    pub fn reclaim(&mut self) -> usize {
        let now = Instant::now();
        let generation = self.generation;
        let before = self.entries.len();

        self.entries
            .retain(|_, entry| entry.is_live_at(generation, now));

        let removed = before - self.entries.len();
        self.stats.record_reclaimed(removed);
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut stats = self.stats.clone();
        stats.generation = self.generation;
        stats.resident_entries = self.entries.len();
        stats.live_entries = self
            .entries
            .values()
            .filter(|entry| entry.is_live_at(self.generation, now))
            .count();
        stats
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn sliding_window(&self) -> Duration {
        self.sliding_window
    }

    // == Length ==
    /// Returns the number of physically resident entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
