//! Processed Message Tracker
//!
//! Remembers ids of change messages that were already handled so broker
//! redeliveries are skipped. Bounded by both capacity and age.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

// == Processed Messages ==
/// Insertion-ordered id set with FIFO eviction and a retention window.
///
/// `order` runs oldest to newest and always holds exactly the ids in `seen`.
#[derive(Debug)]
pub struct ProcessedMessages {
    seen: HashMap<String, Instant>,
    order: VecDeque<String>,
    capacity: usize,
    retention: Duration,
}

impl ProcessedMessages {
    // == Constructor ==
    /// Creates a tracker holding at most `capacity` ids for at most `retention`.
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            retention,
        }
    }

    // == Contains ==
    /// Returns true if `id` was recorded and has not aged out by `now`.
    pub fn contains(&self, id: &str, now: Instant) -> bool {
        self.seen
            .get(id)
            .is_some_and(|recorded| now.saturating_duration_since(*recorded) < self.retention)
    }

    // == Insert ==
    /// Records `id`. Returns false if it was already recorded.
    ///
    /// Aged-out ids are dropped first; the oldest ids are evicted when over capacity.
    pub fn insert(&mut self, id: &str, now: Instant) -> bool {
        self.prune(now);

        if self.seen.contains_key(id) {
            return false;
        }

        self.seen.insert(id.to_string(), now);
        self.order.push_back(id.to_string());

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    // == Prune ==
    /// Drops ids older than the retention window.
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.order.front() {
            let expired = self
                .seen
                .get(oldest)
                .map_or(true, |recorded| now.saturating_duration_since(*recorded) >= self.retention);
            if !expired {
                break;
            }
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
