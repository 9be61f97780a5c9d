//! Metrics recorded while translating and running pipelines.
//!
//! Instruments are created from the global OpenTelemetry meter, so
//! they are no-ops until [`initialize_metrics`] installs a provider.
//! Once installed, [`render`] returns everything recorded so far in
//! the Prometheus text format.

use std::sync::Mutex;
use std::sync::PoisonError;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;
use opentelemetry_sdk::metrics::new_view;
use opentelemetry_sdk::metrics::Aggregation;
use opentelemetry_sdk::metrics::Instrument;
use opentelemetry_sdk::metrics::MeterProvider;
use opentelemetry_sdk::metrics::Stream;
use prometheus::default_registry;
use prometheus::Encoder;
use prometheus::TextEncoder;

use crate::errors::Error;
use crate::errors::Result;

#[macro_export]
macro_rules! with_timer {
    ($histogram: expr, $labels: expr, $body: expr) => {{
        let now = std::time::Instant::now();
        let res = $body;
        $histogram.record(now.elapsed().as_secs_f64(), &$labels);
        res
    }};
}

static INITIALIZED: Mutex<bool> = Mutex::new(false);

/// Initialize the global registry for Prometheus metrics, and create
/// a global MeterProvider.
///
/// Only the first call in a process installs anything.
pub fn initialize_metrics() -> Result<()> {
    let mut initialized = INITIALIZED.lock().unwrap_or_else(PoisonError::into_inner);
    if *initialized {
        return Ok(());
    }

    // Initialize the global default registry for prometheus metrics
    // as internally it's a lazy static.
    let registry = default_registry();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .with_namespace("flowport")
        .build()
        .map_err(|err| Error::Metrics(err.to_string()))?;

    let provider = MeterProvider::builder()
        .with_reader(exporter)
        .with_view(
            new_view(
                Instrument::new().name("*duration*"), // Must match histogram name
                Stream::new().aggregation(Aggregation::ExplicitBucketHistogram {
                    boundaries: vec![
                        0.0, 0.0005, 0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0,
                        2.5, 5.0, 7.5, 10.0,
                    ],
                    record_min_max: true,
                }),
            )
            .map_err(|err| Error::Metrics(err.to_string()))?,
        )
        .build();
    global::set_meter_provider(provider);
    *initialized = true;
    Ok(())
}

/// Everything recorded so far, in the Prometheus text format.
pub fn render() -> Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&default_registry().gather(), &mut buf)
        .map_err(|err| Error::Metrics(err.to_string()))?;
    String::from_utf8(buf).map_err(|err| Error::Metrics(err.to_string()))
}

pub(crate) fn meter() -> Meter {
    global::meter("flowport")
}

/// How long each transform handler took to build its operators.
pub(crate) fn translate_step_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("translate.step.duration")
        .with_description("transform translation duration in seconds")
        .init()
}

/// Elements dropped by grouping because their window had expired.
pub(crate) fn late_elements() -> Counter<u64> {
    meter()
        .u64_counter("group_by_key.late_elements")
        .with_description("elements dropped for arriving after their window expired")
        .init()
}

/// Windows emitted by grouping.
pub(crate) fn firings() -> Counter<u64> {
    meter()
        .u64_counter("group_by_key.firings")
        .with_description("grouped windows emitted")
        .init()
}
