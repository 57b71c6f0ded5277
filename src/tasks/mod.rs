//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Reclamation: Removes expired and stale cache entries at configured intervals
//! - Refresh: Clears and reloads the cache on a daily or rolling schedule

mod cleanup;
mod refresh;

pub use cleanup::spawn_cleanup_task;
pub use refresh::{spawn_refresh_task, RefreshSchedule};
