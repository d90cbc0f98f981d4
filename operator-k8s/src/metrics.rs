#![allow(clippy::expect_used)] // failure here means the binary can never start

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use tracing::error;

/// Returns a vector of exponentially spaced time buckets for a duration histogram.
fn exponential_time_bucket(start: f64, factor: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start * factor.powi(i as i32)).collect()
}

lazy_static! {
    pub(crate) static ref REGISTRY: Registry = Registry::new();
    pub(crate) static ref RECONCILE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "helx_operator_reconcile_duration_seconds",
            "Duration of a single reconcile invocation in seconds",
        )
        .buckets(exponential_time_bucket(0.01, 2.0, 10))
    )
    .expect("failed to create helx_operator_reconcile_duration_seconds histogram");
    pub(crate) static ref RECONCILE_FAILED_COUNT: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "helx_operator_reconcile_failed_count",
            "Number of reconciles that returned an error, by observed resource kind"
        ),
        &["kind"]
    )
    .expect("failed to create helx_operator_reconcile_failed_count counter");
    pub(crate) static ref ARTIFACTS_APPLIED_COUNT: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "helx_operator_artifacts_applied_count",
            "Number of derived artifacts created or patched, by kind"
        ),
        &["kind"]
    )
    .expect("failed to create helx_operator_artifacts_applied_count counter");
}

/// Register every metric with the process-global registry. Call once at startup.
pub(crate) fn init() {
    REGISTRY
        .register(Box::new(RECONCILE_DURATION.clone()))
        .expect("failed to register helx_operator_reconcile_duration_seconds histogram");
    REGISTRY
        .register(Box::new(RECONCILE_FAILED_COUNT.clone()))
        .expect("failed to register helx_operator_reconcile_failed_count counter");
    REGISTRY
        .register(Box::new(ARTIFACTS_APPLIED_COUNT.clone()))
        .expect("failed to register helx_operator_artifacts_applied_count counter");
}

/// metrics handler
#[allow(clippy::unused_async)]
pub(crate) async fn metrics() -> String {
    let mut buf = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(err) = encoder.encode(&metric_families, &mut buf) {
        error!("failed to encode metrics: {}", err);
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
