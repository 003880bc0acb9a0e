//! Cache key derivation.
//!
//! A key is the first 128 bits of SHA-256 over a canonical string built from the locale, shop,
//! optional device class and the request path with its query.

use std::fmt;

use sha2::{Digest, Sha256};

use super::context::RequestContext;

const KEY_BYTES: usize = 16;

/// Fingerprint of a cacheable response variant, as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash a canonical string into a key.
    pub fn from_canonical(canonical: &str) -> Self {
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the canonical string for a request. Missing ids become empty strings.
pub fn canonical_string(ctx: &RequestContext, separate_devices: bool) -> String {
    let storefront = ctx.storefront();
    let locale = storefront.locale_id.as_deref().unwrap_or("");
    let shop = storefront.store_id.as_deref().unwrap_or("");
    let url = ctx.path_and_query();

    if separate_devices {
        let device = storefront.device.map(|d| d.as_str()).unwrap_or("");
        format!("device-{device}-lang-{locale}-shop-{shop}-{url}")
    } else {
        format!("lang-{locale}-shop-{shop}-{url}")
    }
}

/// Derive the cache key for a request.
pub fn derive_key(ctx: &RequestContext, separate_devices: bool) -> CacheKey {
    CacheKey::from_canonical(&canonical_string(ctx, separate_devices))
}
