//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

/// Request counter.
pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "dsk_http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap()
});

/// Request latency histogram.
pub static HTTP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "dsk_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap()
});

/// Messages a broker discarded because its queue was full.
pub static BROKER_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "dsk_broker_dropped_total",
        "Total number of messages discarded by brokers"
    )
    .unwrap()
});

/// Completed tree syncs per source.
pub static TREE_SYNCS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "dsk_tree_syncs_total",
        "Total number of completed tree syncs",
        &["source"]
    )
    .unwrap()
});

/// Tree sync duration.
pub static TREE_SYNC_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "dsk_tree_sync_duration_seconds",
        "Tree sync duration in seconds",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap()
});

/// Search queries by kind: full, filter or legacy.
pub static SEARCH_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "dsk_search_queries_total",
        "Total number of search queries",
        &["kind"]
    )
    .unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*HTTP_REQUESTS;
    let _ = &*HTTP_DURATION;
    let _ = &*BROKER_DROPPED;
    let _ = &*TREE_SYNCS;
    let _ = &*TREE_SYNC_DURATION;
    let _ = &*SEARCH_QUERIES;

    tracing::debug!("Prometheus metrics initialized");
}

/// Render all registered metrics in the text exposition format.
#[must_use]
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        init_metrics();

        let before = TREE_SYNCS.with_label_values(&["metrics-test"]).get();
        TREE_SYNCS.with_label_values(&["metrics-test"]).inc();
        assert_eq!(TREE_SYNCS.with_label_values(&["metrics-test"]).get(), before + 1);
    }

    #[test]
    fn test_render() {
        init_metrics();
        SEARCH_QUERIES.with_label_values(&["full"]).inc();

        let text = render();
        assert!(text.contains("dsk_search_queries_total"));
    }
}
