//! Cache Module
//!
//! Provides the generation-tagged attribute store with sliding expiration.

mod entry;
mod key;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{CacheEntry, CachePriority, Generation};
pub use key::{CacheKey, KEY_SEPARATOR};
pub use stats::CacheStats;
pub use store::{CacheStore, SharedStore};

// == Public Constants ==
/// Maximum allowed length of a single key component in bytes
pub const MAX_KEY_COMPONENT_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

/// Default sliding expiration window
pub const DEFAULT_SLIDING_WINDOW_SECS: u64 = 30 * 60;
