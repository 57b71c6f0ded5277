//! Attribute Cache - A replicated attribute-value cache server
//!
//! Serves attribute lookups from memory and keeps replicas converged by
//! publishing every local write and applying writes received from peers.

pub mod api;
pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod replication;
pub mod seed;
pub mod service;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use service::CacheService;
pub use tasks::{spawn_cleanup_task, spawn_refresh_task};
