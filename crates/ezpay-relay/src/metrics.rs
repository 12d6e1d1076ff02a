use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

pub static RELAY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "ezpay_relay_requests_total",
        "Relay requests by endpoint and outcome",
        &["endpoint", "result"]
    )
    .unwrap()
});

pub static SUBMIT_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "ezpay_relay_submit_duration_seconds",
        "Time from request to confirmed receipt, in seconds",
        &["endpoint", "result"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap()
});

pub static METRICS_AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "ezpay_relay_metrics_auth_failures_total",
        "Rejected /metrics scrapes",
        &["reason"]
    )
    .unwrap()
});

/// Count one request and record how long it took.
pub fn observe(endpoint: &str, result: &str, elapsed_secs: f64) {
    RELAY_REQUESTS.with_label_values(&[endpoint, result]).inc();
    SUBMIT_LATENCY
        .with_label_values(&[endpoint, result])
        .observe(elapsed_secs);
}

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
