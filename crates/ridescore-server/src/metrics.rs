//! Prometheus metrics for the RideScore server
//!
//! Tracks:
//! - Request latency and counts per endpoint
//! - Score outcomes (prediction / incomplete / error)
//! - Online lookup latency per provider
//! - Registry query latency

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// HTTP request latency histogram
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "ridescore_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "endpoint", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// HTTP request counter
    pub static ref HTTP_REQUEST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ridescore_http_requests_total",
        "Total HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    /// Requests currently being handled
    pub static ref ACTIVE_REQUESTS: IntGauge = register_int_gauge!(
        "ridescore_active_requests",
        "Number of in-flight HTTP requests"
    )
    .unwrap();

    /// Score calls by outcome
    pub static ref SCORE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ridescore_score_requests_total",
        "Total score calls by outcome",
        &["outcome"]
    )
    .unwrap();

    /// End-to-end score latency (lookup + predict)
    pub static ref SCORE_DURATION: HistogramVec = register_histogram_vec!(
        "ridescore_score_duration_seconds",
        "Score latency in seconds",
        &["outcome"],
        vec![0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    /// Online lookup latency, retries included
    pub static ref FEATURE_LOOKUP_DURATION: HistogramVec = register_histogram_vec!(
        "ridescore_feature_lookup_duration_seconds",
        "Online feature lookup latency in seconds",
        &["provider", "status"],
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    /// Null features seen in incomplete rows
    pub static ref MISSING_FEATURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ridescore_missing_features_total",
        "Features that were null when a row was incomplete",
        &["feature"]
    )
    .unwrap();

    /// Error counter by type
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ridescore_errors_total",
        "Total errors by type",
        &["error_type", "component"]
    )
    .unwrap();

    /// Registry query duration histogram
    pub static ref REGISTRY_QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "ridescore_registry_query_duration_seconds",
        "Registry query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Timer for one HTTP request, observed by the metrics middleware
///
/// The in-flight gauge is released on drop, so requests cut short by a
/// timeout or a client disconnect are still counted out.
pub struct RequestTimer {
    start: std::time::Instant,
    method: String,
    endpoint: String,
    in_flight: IntGauge,
}

impl RequestTimer {
    pub fn new(method: String, endpoint: String) -> Self {
        Self::tracking(ACTIVE_REQUESTS.clone(), method, endpoint)
    }

    fn tracking(in_flight: IntGauge, method: String, endpoint: String) -> Self {
        in_flight.inc();
        Self {
            start: std::time::Instant::now(),
            method,
            endpoint,
            in_flight,
        }
    }

    pub fn observe(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();
        let status_str = status.to_string();

        HTTP_REQUEST_DURATION
            .with_label_values(&[&self.method, &self.endpoint, &status_str])
            .observe(duration);

        HTTP_REQUEST_TOTAL
            .with_label_values(&[&self.method, &self.endpoint, &status_str])
            .inc();
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.in_flight.dec();
    }
}

pub fn record_score(outcome: &str, duration_seconds: f64) {
    SCORE_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    SCORE_DURATION
        .with_label_values(&[outcome])
        .observe(duration_seconds);
}

pub fn record_lookup(provider: &str, success: bool, duration_seconds: f64) {
    let status = if success { "success" } else { "error" };
    FEATURE_LOOKUP_DURATION
        .with_label_values(&[provider, status])
        .observe(duration_seconds);
}

pub fn record_missing_feature(feature: &str) {
    MISSING_FEATURES_TOTAL.with_label_values(&[feature]).inc();
}

pub fn record_error(error_type: &str, component: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type, component]).inc();
}

pub fn record_registry_query(operation: &str, duration_seconds: f64) {
    REGISTRY_QUERY_DURATION
        .with_label_values(&[operation])
        .observe(duration_seconds);
}
