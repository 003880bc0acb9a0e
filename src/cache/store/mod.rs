//! Page storage backends.
//!
//! The gate only needs `get`, `set` with a time-to-live, and `clean`. Two backends ship with
//! the crate: an in-process LRU map and a directory of files that several processes can share.

mod files;
mod memory;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::config::CacheConfig;
use super::keys::CacheKey;

pub use files::FileStore;
pub use memory::MemoryStore;

/// Longest time-to-live a backend honours. Longer values are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt cache entry at {}", .path.display())]
    Corrupt { path: PathBuf },
    #[error("store task failed: {0}")]
    Task(String),
}

/// Key/value storage for rendered pages.
///
/// Implementations must tolerate concurrent calls from many requests; the gate takes no lock
/// of its own.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Backend name, recorded in the provenance marker of every stored page.
    fn name(&self) -> &'static str;

    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Remove every entry.
    async fn clean(&self) -> Result<(), StoreError>;
}

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDriver {
    Memory,
    Files,
}

impl StoreDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreDriver::Memory => "memory",
            StoreDriver::Files => "files",
        }
    }

    /// Whether entries are visible to other processes using the same configuration.
    pub fn is_shared(&self) -> bool {
        matches!(self, StoreDriver::Files)
    }
}

impl fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreDriver {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreDriver::Memory),
            "files" | "file" => Ok(StoreDriver::Files),
            other => Err(format!("unknown cache driver `{other}` (expected memory|files)")),
        }
    }
}

/// Build the backend selected by the configuration.
pub fn build_store(config: &CacheConfig) -> Arc<dyn PageStore> {
    match config.driver {
        StoreDriver::Memory => Arc::new(MemoryStore::new(config.memory_capacity_non_zero())),
        StoreDriver::Files => Arc::new(FileStore::new(config.directory.clone())),
    }
}
