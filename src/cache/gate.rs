//! The cache gate.
//!
//! Bound to two points of the request lifecycle: dispatch, where an eligible request may be
//! answered straight from the store, and completion, where the rendered page is recorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use metrics::counter;
use time::{OffsetDateTime, macros::format_description};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::context::RequestContext;
use super::eligibility::{Bypass, EligibilityEvaluator};
use super::keys::{CacheKey, derive_key};
use super::listener::InvalidationListener;
use super::maintenance::MaintenanceStatusProvider;
use super::store::PageStore;

const METRIC_HIT_TOTAL: &str = "frontcache_hit_total";
const METRIC_MISS_TOTAL: &str = "frontcache_miss_total";
const METRIC_STORE_TOTAL: &str = "frontcache_store_total";
const METRIC_BYPASS_TOTAL: &str = "frontcache_bypass_total";
const METRIC_STORE_ERROR_TOTAL: &str = "frontcache_store_error_total";

/// Response header marking pages served from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-frontcache";

/// A page read back from the store.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub key: CacheKey,
    pub body: Bytes,
}

impl IntoResponse for CachedPage {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, self.body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
        response
    }
}

#[derive(Clone, Copy)]
enum Stage {
    Start,
    Complete,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Complete => "complete",
        }
    }
}

/// Orchestrates eligibility, key derivation and store access for each request.
pub struct CacheGate {
    config: Arc<CacheConfig>,
    store: Arc<dyn PageStore>,
    evaluator: EligibilityEvaluator,
    active: Arc<AtomicBool>,
}

impl CacheGate {
    /// Create an active gate.
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn PageStore>,
        maintenance: Arc<dyn MaintenanceStatusProvider>,
    ) -> Self {
        let evaluator = EligibilityEvaluator::new(config.check_maintenance, maintenance);
        Self {
            config: Arc::new(config),
            store,
            evaluator,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    pub fn evaluator(&self) -> &EligibilityEvaluator {
        &self.evaluator
    }

    /// Listener sharing this gate's store and activation state.
    pub fn listener(&self) -> InvalidationListener {
        InvalidationListener::new(self.store.clone(), self.active.clone())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Key for the request, identical at dispatch and completion.
    pub fn key_for(&self, ctx: &RequestContext) -> CacheKey {
        derive_key(ctx, self.config.separate_mobile_and_desktop)
    }

    /// Look the request up at dispatch time.
    ///
    /// `Some` means the caller must answer with the page and skip all further processing.
    pub async fn on_request_start(&self, ctx: &RequestContext) -> Option<CachedPage> {
        if let Err(reason) = self.admit(ctx) {
            record_bypass(reason, Stage::Start);
            return None;
        }

        let key = self.key_for(ctx);
        match self.store.get(&key).await {
            Ok(Some(body)) => {
                counter!(METRIC_HIT_TOTAL).increment(1);
                debug!(key = %key, outcome = "hit", "serving cached page");
                Some(CachedPage { key, body })
            }
            Ok(None) => {
                counter!(METRIC_MISS_TOTAL).increment(1);
                debug!(key = %key, outcome = "miss", "page not cached");
                None
            }
            Err(err) => {
                counter!(METRIC_MISS_TOTAL).increment(1);
                counter!(METRIC_STORE_ERROR_TOTAL, "op" => "get").increment(1);
                warn!(key = %key, store = self.store.name(), error = %err, "page store read failed, treating as miss");
                None
            }
        }
    }

    /// Whether the rendered page of this request may be recorded.
    pub fn should_record(&self, ctx: &RequestContext) -> bool {
        let verdict = self.admit(ctx).and_then(|()| {
            if self.evaluator.in_maintenance(ctx) {
                Err(Bypass::Maintenance)
            } else {
                Ok(())
            }
        });

        match verdict {
            Ok(()) => true,
            Err(reason) => {
                record_bypass(reason, Stage::Complete);
                false
            }
        }
    }

    /// Record the rendered page at completion time. Returns true when the page was stored.
    pub async fn on_request_complete(&self, ctx: &RequestContext, output: &[u8]) -> bool {
        if !self.should_record(ctx) {
            return false;
        }
        self.record(ctx, output).await
    }

    /// Store `output` under the request's key, prefixed with a provenance marker.
    ///
    /// Callers are expected to have checked [`CacheGate::should_record`].
    pub async fn record(&self, ctx: &RequestContext, output: &[u8]) -> bool {
        let key = self.key_for(ctx);
        let marker = provenance_marker(&key, self.store.name(), OffsetDateTime::now_utc());

        let mut page = BytesMut::with_capacity(marker.len() + output.len());
        page.extend_from_slice(marker.as_bytes());
        page.extend_from_slice(output);

        match self.store.set(&key, page.freeze(), self.config.ttl).await {
            Ok(()) => {
                counter!(METRIC_STORE_TOTAL).increment(1);
                debug!(key = %key, bytes = output.len(), "page cached");
                true
            }
            Err(err) => {
                counter!(METRIC_STORE_ERROR_TOTAL, "op" => "set").increment(1);
                warn!(key = %key, store = self.store.name(), error = %err, "page store write failed, page not cached");
                false
            }
        }
    }

    fn admit(&self, ctx: &RequestContext) -> Result<(), Bypass> {
        if !self.is_active() {
            return Err(Bypass::Inactive);
        }

        if ctx
            .controller()
            .is_some_and(|controller| self.config.is_excluded_controller(&controller.name))
        {
            return Err(Bypass::ExcludedController);
        }

        self.evaluator.evaluate(ctx)
    }
}

fn record_bypass(reason: Bypass, stage: Stage) {
    counter!(
        METRIC_BYPASS_TOTAL,
        "reason" => reason.as_str(),
        "stage" => stage.as_str()
    )
    .increment(1);
    debug!(reason = %reason, stage = stage.as_str(), "page cache bypassed");
}

/// Debug annotation prepended to every stored page.
pub fn provenance_marker(key: &CacheKey, backend: &str, at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("<!-- {key} from {backend} on {stamp} -->\n")
}
