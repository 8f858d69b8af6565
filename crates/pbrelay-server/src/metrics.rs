use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

pub static EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "pbrelay_events_total",
        "Webhook events by processing outcome",
        &["outcome"]
    )
    .unwrap()
});

pub static PROCESSING_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "pbrelay_processing_duration_seconds",
        "Time from receipt to lookup+create completion",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

pub fn observe(outcome: &str, elapsed_secs: f64) {
    EVENTS.with_label_values(&[outcome]).inc();
    PROCESSING_LATENCY
        .with_label_values(&[outcome])
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
