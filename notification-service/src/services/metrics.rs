//! Metrics collection for notification-service.
//!
//! Per-channel dispatch counters plus the `metrics` recorder fed by the HTTP
//! middleware.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder handle for `metrics` macros. `None` when another recorder was
/// already installed in this process.
static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Provider call latency, one observation per attempt.
pub static PROVIDER_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "notification_provider_call_duration_seconds",
            "Provider call duration"
        ),
        &["channel"]
    )
    .expect("Failed to register PROVIDER_CALL_DURATION")
});

/// Calls made to a provider, retries included
pub static DISPATCH_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Final outcome of each dispatch request
pub static DISPATCH_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| PrometheusBuilder::new().install_recorder().ok());

    DISPATCH_ATTEMPTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "notification_dispatch_attempts_total",
                "Provider calls by channel, including retries"
            ),
            &["channel"]
        )
        .expect("Failed to register DISPATCH_ATTEMPTS_TOTAL")
    });

    DISPATCH_OUTCOMES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "notification_dispatch_outcomes_total",
                "Dispatch requests by channel and outcome"
            ),
            &["channel", "outcome"]
        )
        .expect("Failed to register DISPATCH_OUTCOMES_TOTAL")
    });

    Lazy::force(&PROVIDER_CALL_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_ok() {
        output.push_str(&String::from_utf8_lossy(&buffer));
    }
    output
}

pub fn record_attempt(channel: &str) {
    if let Some(counter) = DISPATCH_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[channel]).inc();
    }
}

/// `outcome` is `sent`, `replayed` or a provider error kind.
pub fn record_outcome(channel: &str, outcome: &str) {
    if let Some(counter) = DISPATCH_OUTCOMES_TOTAL.get() {
        counter.with_label_values(&[channel, outcome]).inc();
    }
}

pub fn observe_provider_call(channel: &str, seconds: f64) {
    PROVIDER_CALL_DURATION
        .with_label_values(&[channel])
        .observe(seconds);
}
