//! Frontcache page cache.
//!
//! Serves rendered storefront pages from a store when a request is safe to cache, records fresh
//! pages on completion, and purges everything when content changes.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `frontcache.toml`:
//!
//! ```toml
//! [cache]
//! ttl_seconds = 86400
//! driver = "files"
//! directory = "cache/pages"
//! separate_mobile_and_desktop = false
//! check_maintenance = true
//! # ... see config.rs for all options
//! ```

mod config;
mod context;
mod eligibility;
mod events;
mod gate;
mod keys;
mod listener;
mod maintenance;
mod middleware;
mod store;

pub use config::{CacheConfig, DEFAULT_EXCLUDED_CONTROLLERS};
pub use context::{
    Controller, ControllerKind, DeviceClass, RequestContext, SessionState, Storefront,
};
pub use eligibility::{Bypass, EligibilityEvaluator};
pub use events::{FORWARDED_HOOKS, MutationEvent};
pub use gate::{CACHE_STATUS_HEADER, CacheGate, CachedPage, provenance_marker};
pub use keys::{CacheKey, canonical_string, derive_key};
pub use listener::InvalidationListener;
pub use maintenance::{MaintenanceError, MaintenanceStatusProvider, MaintenanceSwitch};
pub use middleware::{CacheState, page_cache_layer, should_store_response};
pub use store::{
    FileStore, MAX_TTL, MemoryStore, PageStore, StoreDriver, StoreError, build_store,
};
