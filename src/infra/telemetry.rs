//! Logging and metric descriptions for the shelfmark binary.
//!
//! Command results own stdout, so every log line goes to stderr. The filter
//! starts from the configured level and `RUST_LOG` may refine it per target.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Clone, Copy)]
enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Every metric the cache and mutation paths emit.
const METRICS: &[(MetricKind, &str, Unit, &str)] = &[
    (
        MetricKind::Counter,
        "shelfmark_mutation_total",
        Unit::Count,
        "Mutations by kind and outcome (settled, rolled back, conflict, abandoned).",
    ),
    (
        MetricKind::Histogram,
        "shelfmark_mutation_ms",
        Unit::Milliseconds,
        "Time from optimistic write to settle or rollback.",
    ),
    (
        MetricKind::Counter,
        "shelfmark_cache_fetch_total",
        Unit::Count,
        "Finished list fetches by outcome (ok, error, discarded).",
    ),
    (
        MetricKind::Counter,
        "shelfmark_cache_fetch_cancelled_total",
        Unit::Count,
        "List fetches superseded by a mutation, a stale mark or a newer fetch.",
    ),
    (
        MetricKind::Counter,
        "shelfmark_cache_evict_total",
        Unit::Count,
        "Unobserved list entries collected past the idle limit.",
    ),
    (
        MetricKind::Gauge,
        "shelfmark_cache_event_queue_len",
        Unit::Count,
        "Invalidation events waiting to be consumed.",
    ),
    (
        MetricKind::Counter,
        "shelfmark_cache_event_dropped_total",
        Unit::Count,
        "Manual refresh events dropped because the queue was full.",
    ),
    (
        MetricKind::Histogram,
        "shelfmark_cache_consume_ms",
        Unit::Milliseconds,
        "Time spent applying one batch of invalidation events.",
    ),
    (
        MetricKind::Counter,
        "shelfmark_cache_lock_poisoned_total",
        Unit::Count,
        "Cache locks recovered after a panic while held.",
    ),
];

/// Install the global subscriber: level filter, span traces for errors and
/// one stderr formatter.
///
/// Fails if a subscriber is already installed.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(stderr_layer(logging.format))
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

/// JSON lines for machines, compact lines for terminals.
fn stderr_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    }
}

/// Register units and help text with whichever recorder is installed.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for &(kind, name, unit, help) in METRICS {
            match kind {
                MetricKind::Counter => describe_counter!(name, unit, help),
                MetricKind::Gauge => describe_gauge!(name, unit, help),
                MetricKind::Histogram => describe_histogram!(name, unit, help),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn metric_table_is_prefixed_and_unique() {
        let mut seen = HashSet::new();
        for (_, name, _, help) in METRICS {
            assert!(name.starts_with("shelfmark_"), "{name}");
            assert!(!help.is_empty(), "{name} has no description");
            assert!(seen.insert(*name), "{name} described twice");
        }
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn second_init_reports_telemetry_error() {
        let logging = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Compact,
        };

        let _ = init(&logging);
        let err = init(&logging).expect_err("subscriber already installed");
        assert!(matches!(err, InfraError::Telemetry(_)));
    }
}
