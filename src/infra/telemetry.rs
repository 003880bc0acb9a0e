use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "frontcache_hit_total",
            Unit::Count,
            "Total number of pages served from the cache."
        );
        describe_counter!(
            "frontcache_miss_total",
            Unit::Count,
            "Total number of eligible lookups that found no live page."
        );
        describe_counter!(
            "frontcache_store_total",
            Unit::Count,
            "Total number of rendered pages written to the store."
        );
        describe_counter!(
            "frontcache_bypass_total",
            Unit::Count,
            "Total number of requests that skipped the cache, by reason and stage."
        );
        describe_counter!(
            "frontcache_store_error_total",
            Unit::Count,
            "Total number of failed page store operations, by operation."
        );
        describe_counter!(
            "frontcache_purge_total",
            Unit::Count,
            "Total number of full store purges, by trigger."
        );
        describe_counter!(
            "frontcache_evict_total",
            Unit::Count,
            "Total number of memory store evictions due to capacity."
        );
    });
}
