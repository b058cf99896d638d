use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_BACKEND_ERROR_TOTAL, METRIC_CACHE_COALESCED_TOTAL,
    METRIC_CACHE_DECODE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
    METRIC_CACHE_POPULATE_MS,
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

/// Registers descriptions for every cache metric with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of read-through cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of read-through cache misses."
        );
        describe_counter!(
            METRIC_CACHE_DECODE_ERROR_TOTAL,
            Unit::Count,
            "Cached entries discarded because they could not be decoded."
        );
        describe_counter!(
            METRIC_CACHE_BACKEND_ERROR_TOTAL,
            Unit::Count,
            "Cache backend failures on lookup or write."
        );
        describe_counter!(
            METRIC_CACHE_COALESCED_TOTAL,
            Unit::Count,
            "Misses that waited on an in-flight fetch for the same key."
        );
        describe_histogram!(
            METRIC_CACHE_POPULATE_MS,
            Unit::Milliseconds,
            "Time spent producing a value on a cache miss."
        );
    });
}
