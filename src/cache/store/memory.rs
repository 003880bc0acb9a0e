//! In-process LRU page store.
//!
//! All operations take the same mutex, so `clean` and `set` are linearized: a write that
//! acquires the lock after a purge survives it, one that acquired it before is wiped.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tracing::warn;

use super::{MAX_TTL, PageStore, StoreError};
use crate::cache::keys::CacheKey;

const METRIC_EVICT_TOTAL: &str = "frontcache_evict_total";

struct MemoryEntry {
    body: Bytes,
    expires_at: Instant,
}

/// Bounded in-memory store with per-entry expiry.
pub struct MemoryStore {
    entries: Mutex<LruCache<CacheKey, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until they are next read.
    pub fn len(&self) -> usize {
        self.lock("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, LruCache<CacheKey, MemoryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    store = "memory",
                    result = "poisoned_recovered",
                    "Recovered from poisoned page store lock"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        let mut entries = self.lock("get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.body.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = MemoryEntry {
            body: value,
            expires_at: now
                .checked_add(ttl.min(MAX_TTL))
                .unwrap_or(now),
        };
        let evicted = self.lock("set").push(key.clone(), entry);
        if evicted.is_some_and(|(evicted_key, _)| &evicted_key != key) {
            counter!(METRIC_EVICT_TOTAL).increment(1);
        }
        Ok(())
    }

    async fn clean(&self) -> Result<(), StoreError> {
        self.lock("clean").clear();
        Ok(())
    }
}
