use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
};
use std::time::Instant;

lazy_static! {
    pub static ref GATEWAY_UP: IntGauge = register_int_gauge!(
        "gateway_up",
        "Whether the gateway is up (1) or down (0)"
    ).unwrap();

    // Aggregate query metrics
    pub static ref QUERIES_TOTAL: IntCounter = register_int_counter!(
        "gateway_queries_total",
        "Total number of aggregate metric queries received"
    ).unwrap();

    pub static ref QUERY_FAILURES: IntCounterVec = register_int_counter_vec!(
        "gateway_query_failures_total",
        "Total number of failed aggregate queries by error kind",
        &["kind"]
    ).unwrap();

    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        "gateway_query_duration_seconds",
        "Aggregate query duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 30.0]
    ).unwrap();

    // Backend sub-query metrics
    pub static ref BACKEND_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "gateway_backend_requests_total",
        "Total number of sub-queries sent to the metrics backend by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref BACKEND_REQUEST_DURATION: Histogram = register_histogram!(
        "gateway_backend_request_duration_seconds",
        "Metrics backend request duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 30.0]
    ).unwrap();
}

pub fn init_metrics() {
    GATEWAY_UP.set(1);
}

/// Counts an aggregate query on creation and observes its duration on drop.
pub struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    pub fn new() -> Self {
        QUERIES_TOTAL.inc();
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for QueryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        QUERY_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_query_failure(kind: &str) {
    QUERY_FAILURES.with_label_values(&[kind]).inc();
}

pub fn record_backend_request(outcome: &str, duration_secs: f64) {
    BACKEND_REQUESTS.with_label_values(&[outcome]).inc();
    BACKEND_REQUEST_DURATION.observe(duration_secs);
}

/// Renders every registered collector in the Prometheus text format.
pub fn encode() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
