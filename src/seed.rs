//! Seed Sources
//!
//! Authoritative data the cache is rebuilt from on reload.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::replication::ChangeMessage;

// == Seed Source Trait ==
#[async_trait]
pub trait SeedSource: Send + Sync {
    /// Returns the full set of entries the cache should hold after a reload.
    async fn load(&self) -> Result<Vec<ChangeMessage>>;
}

// == Static Seed ==
/// Fixed in-memory entry set.
#[derive(Debug, Clone, Default)]
pub struct StaticSeed {
    entries: Vec<ChangeMessage>,
}

impl StaticSeed {
    pub fn new(entries: Vec<ChangeMessage>) -> Self {
        Self { entries }
    }

    /// Entries shipped with the server when no seed file is configured.
    pub fn builtin() -> Self {
        Self::new(vec![
            ChangeMessage::new("100", "001", "currency", "USD"),
            ChangeMessage::new("100", "001", "region", "us-east"),
            ChangeMessage::new("100", "002", "currency", "EUR"),
            ChangeMessage::new("100", "002", "region", "eu-west"),
        ])
    }
}

#[async_trait]
impl SeedSource for StaticSeed {
    async fn load(&self) -> Result<Vec<ChangeMessage>> {
        Ok(self.entries.clone())
    }
}

// == JSON File Seed ==
/// JSON array of change messages read from disk on every reload.
#[derive(Debug, Clone)]
pub struct JsonFileSeed {
    path: PathBuf,
}

impl JsonFileSeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SeedSource for JsonFileSeed {
    async fn load(&self) -> Result<Vec<ChangeMessage>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CacheError::Seed(format!("{}: {}", self.path.display(), e)))?;

        serde_json::from_str(&text)
            .map_err(|e| CacheError::Seed(format!("{}: {}", self.path.display(), e)))
    }
}
