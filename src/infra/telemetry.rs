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

pub const RESOURCE_CACHE_HIT: &str = "slidepane_resource_cache_hit_total";
pub const RESOURCE_CACHE_MISS: &str = "slidepane_resource_cache_miss_total";
pub const RANGE_CACHE_HIT: &str = "slidepane_range_cache_hit_total";
pub const RANGE_CACHE_MISS: &str = "slidepane_range_cache_miss_total";
pub const KNIT_RUNS: &str = "slidepane_knit_runs_total";

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
            RESOURCE_CACHE_HIT,
            Unit::Count,
            "Total number of resource text lookups served from memory."
        );
        describe_counter!(
            RESOURCE_CACHE_MISS,
            Unit::Count,
            "Total number of resource text lookups that loaded from disk."
        );
        describe_counter!(
            RANGE_CACHE_HIT,
            Unit::Count,
            "Total number of range requests answered from the cached file slot."
        );
        describe_counter!(
            RANGE_CACHE_MISS,
            Unit::Count,
            "Total number of range requests that reloaded the file slot."
        );
        describe_counter!(
            KNIT_RUNS,
            Unit::Count,
            "Total number of knit subprocess invocations."
        );
    });
}
