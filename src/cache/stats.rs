//! Cache Statistics Module
//!
//! Tracks cache read/write counters and invalidation activity.

use serde::Serialize;

use crate::cache::Generation;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of reads that returned a live value
    pub hits: u64,
    /// Number of reads that found nothing live (absent, expired or stale)
    pub misses: u64,
    /// Number of writes applied to the store
    pub writes: u64,
    /// Number of generation switches
    pub invalidations: u64,
    /// Entries removed by the reclamation sweep
    pub reclaimed: u64,
    /// Current generation
    pub generation: Generation,
    /// Entries physically resident, including dead ones awaiting reclamation
    pub resident_entries: usize,
    /// Entries observable in the current generation
    pub live_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_invalidation(&mut self, generation: Generation) {
        self.invalidations += 1;
        self.generation = generation;
    }

    pub fn record_reclaimed(&mut self, count: usize) {
        self.reclaimed += count as u64;
    }
}
