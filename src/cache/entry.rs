//! Cache Entry Module
//!
//! Defines individual cache entries with sliding expiration and a generation tag.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

// == Generation ==
/// Invalidation epoch. Entries tagged with an older generation are dead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The generation a fresh store starts in.
    pub const INITIAL: Generation = Generation(0);

    /// Returns the generation that follows this one.
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// == Cache Priority ==
/// Retention priority recorded on each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    High,
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored attribute value
    pub value: String,
    /// Retention priority, always `High` for attribute entries
    pub priority: CachePriority,
    /// Generation the entry was written in
    pub generation: Generation,
    /// Last write or read of the entry
    pub last_access: Instant,
    /// Idle time after which the entry expires
    pub sliding_window: Duration,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new high-priority entry in `generation`, accessed now.
    pub fn new(value: String, generation: Generation, sliding_window: Duration) -> Self {
        Self {
            value,
            priority: CachePriority::High,
            generation,
            last_access: Instant::now(),
            sliding_window,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has been idle for at least its sliding window.
    ///
    /// An entry is expired once `now - last_access >= sliding_window`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access) >= self.sliding_window
    }

    /// Checks if the entry is observable in the `current` generation at `now`.
    pub fn is_live_at(&self, current: Generation, now: Instant) -> bool {
        self.generation == current && !self.is_expired_at(now)
    }

    // == Touch ==
    /// Restarts the sliding window.
    pub fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }
}
