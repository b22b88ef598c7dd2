//! Prometheus metrics for the featline server
//!
//! Tracks:
//! - HTTP request counts and latency per route
//! - Retrieval call outcomes and latency
//! - Returned feature values per status

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use featline_serving::RetrievalResponse;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// HTTP request counter
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "featline_http_requests_total",
        "Total HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    /// HTTP request latency histogram
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "featline_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    /// Retrieval calls by outcome (`success` or the error category)
    pub static ref ONLINE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "featline_online_requests_total",
        "Total online retrieval calls",
        &["status"]
    )
    .unwrap();

    /// Retrieval call latency
    pub static ref ONLINE_REQUEST_DURATION: Histogram = register_histogram!(
        "featline_online_request_duration_seconds",
        "Online retrieval latency in seconds",
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    /// Returned values by field status
    pub static ref FEATURE_VALUES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "featline_feature_values_total",
        "Feature values returned, by status",
        &["status"]
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

/// Times one HTTP request
pub struct RequestTimer {
    start: std::time::Instant,
    method: String,
    endpoint: String,
}

impl RequestTimer {
    pub fn new(method: String, endpoint: String) -> Self {
        Self {
            start: std::time::Instant::now(),
            method,
            endpoint,
        }
    }

    pub fn observe(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        HTTP_REQUEST_DURATION
            .with_label_values(&[&self.method, &self.endpoint])
            .observe(duration);

        HTTP_REQUESTS_TOTAL
            .with_label_values(&[&self.method, &self.endpoint, &status.to_string()])
            .inc();
    }
}

/// Middleware recording every request under its route pattern
pub async fn track_http(request: Request, next: Next) -> Response {
    // Route patterns, not raw paths, keep label cardinality bounded
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestTimer::new(request.method().to_string(), endpoint);

    let response = next.run(request).await;
    timer.observe(response.status().as_u16());
    response
}

/// Records one successful retrieval call
pub fn record_online_success(response: &RetrievalResponse, duration_seconds: f64) {
    ONLINE_REQUESTS_TOTAL.with_label_values(&["success"]).inc();
    ONLINE_REQUEST_DURATION.observe(duration_seconds);

    for (status, count) in response.status_counts() {
        FEATURE_VALUES_TOTAL.with_label_values(&[status]).inc_by(count);
    }
}

/// Records one failed retrieval call under its error category
pub fn record_online_failure(category: &str, duration_seconds: f64) {
    ONLINE_REQUESTS_TOTAL.with_label_values(&[category]).inc();
    ONLINE_REQUEST_DURATION.observe(duration_seconds);
}
