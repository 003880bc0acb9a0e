//! Invalidation listener.
//!
//! Purges the whole page store whenever content changes. No per-key tracking is attempted: any
//! mutation empties the cache, so stale pages are never served after a forwarded event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use tracing::{info, warn};

use super::events::MutationEvent;
use super::store::{PageStore, StoreError};

const METRIC_PURGE_TOTAL: &str = "frontcache_purge_total";

/// Reacts to content mutations and controls the cache's activation state.
///
/// Cloning is cheap; clones share the store and activation flag with the gate that created them.
#[derive(Clone)]
pub struct InvalidationListener {
    store: Arc<dyn PageStore>,
    active: Arc<AtomicBool>,
}

impl InvalidationListener {
    pub(super) fn new(store: Arc<dyn PageStore>, active: Arc<AtomicBool>) -> Self {
        Self { store, active }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Handle a normalized event. Returns true when the store was purged.
    pub async fn on_event(&self, event: MutationEvent) -> Result<bool, StoreError> {
        if !self.is_active() {
            info!(event = %event, "cache inactive, event ignored");
            return Ok(false);
        }

        self.purge(event.as_str()).await?;
        Ok(true)
    }

    /// Handle a raw host hook name. Returns the event it mapped to, if any.
    pub async fn on_hook(&self, name: &str) -> Result<Option<MutationEvent>, StoreError> {
        let Some(event) = MutationEvent::from_hook_name(name) else {
            return Ok(None);
        };
        self.on_event(event).await?;
        Ok(Some(event))
    }

    /// Trigger a content mutation event.
    pub async fn content_mutated(&self) -> Result<bool, StoreError> {
        self.on_event(MutationEvent::ContentMutated).await
    }

    /// Trigger an explicit cache clear.
    pub async fn cache_clear_requested(&self) -> Result<bool, StoreError> {
        self.on_event(MutationEvent::CacheClearRequested).await
    }

    /// Start serving and recording pages.
    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("page cache activated");
        }
    }

    /// Stop serving and recording pages, then purge the store.
    ///
    /// The flag flips before the purge so no write can land after it. The cache stays inactive
    /// even when the purge fails; the error is returned for the caller to report.
    pub async fn deactivate(&self) -> Result<(), StoreError> {
        self.active.store(false, Ordering::SeqCst);
        let result = self.purge("deactivate").await;
        info!(purged = result.is_ok(), "page cache deactivated");
        result
    }

    /// Unconditionally empty the store.
    pub async fn purge(&self, trigger: &'static str) -> Result<(), StoreError> {
        match self.store.clean().await {
            Ok(()) => {
                counter!(METRIC_PURGE_TOTAL, "trigger" => trigger).increment(1);
                info!(trigger, store = self.store.name(), "page cache purged");
                Ok(())
            }
            Err(err) => {
                counter!("frontcache_store_error_total", "op" => "clean").increment(1);
                warn!(trigger, store = self.store.name(), error = %err, "page cache purge failed");
                Err(err)
            }
        }
    }
}
