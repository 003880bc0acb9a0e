//! Cache configuration.
//!
//! Built once at startup from the `[cache]` section of `frontcache.toml` and shared by
//! reference with every cache component.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use super::store::StoreDriver;

// Default values for cache configuration
const DEFAULT_TTL_SECS: u64 = 86_400;
const DEFAULT_DIRECTORY: &str = "cache/pages";
const DEFAULT_MEMORY_CAPACITY: usize = 1_000;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Controllers that take part in checkout and must never be cached.
pub const DEFAULT_EXCLUDED_CONTROLLERS: [&str; 2] = ["OrderController", "OrderOpcController"];

/// Cache configuration value object.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a stored page stays servable.
    pub ttl: Duration,
    /// Storage backend.
    pub driver: StoreDriver,
    /// Directory used by the `files` backend.
    pub directory: PathBuf,
    /// Maximum entries held by the `memory` backend.
    pub memory_capacity: usize,
    /// Split cache entries by device class.
    pub separate_mobile_and_desktop: bool,
    /// Skip the cache while the storefront is disabled.
    pub check_maintenance: bool,
    /// Controller identities excluded from both cache reads and writes.
    pub excluded_controllers: Vec<String>,
    /// Largest rendered body that will be stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            driver: StoreDriver::Memory,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            separate_mobile_and_desktop: false,
            check_maintenance: true,
            excluded_controllers: DEFAULT_EXCLUDED_CONTROLLERS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl: settings.ttl,
            driver: settings.driver,
            directory: settings.directory.clone(),
            memory_capacity: settings.memory_capacity.get(),
            separate_mobile_and_desktop: settings.separate_mobile_and_desktop,
            check_maintenance: settings.check_maintenance,
            excluded_controllers: settings.excluded_controllers.clone(),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

impl CacheConfig {
    /// Returns true when the controller is structurally excluded from caching.
    pub fn is_excluded_controller(&self, name: &str) -> bool {
        self.excluded_controllers
            .iter()
            .any(|excluded| excluded == name)
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
