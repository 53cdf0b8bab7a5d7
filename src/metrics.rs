//! Metrics for the contact trust agent
//!
//! Prometheus-compatible counters and gauges for:
//! - Authorization request admissions and rejections
//! - User decisions by outcome
//! - Handle lookups
//! - HTTP API traffic
use crate::error::{AuthzError, AuthzResult};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Authorization Metrics ==========

    /// Requests admitted into the pending registry
    pub static ref REQUESTS_ADMITTED_TOTAL: IntCounter = register_int_counter!(
        "authz_requests_admitted_total",
        "Total number of authorization requests admitted"
    )
    .unwrap();

    /// Inbound messages not admitted, by reason
    pub static ref REQUESTS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authz_requests_rejected_total",
        "Total number of inbound authorization messages rejected",
        &["reason"]
    )
    .unwrap();

    /// Decisions by kind and result
    pub static ref DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "authz_decisions_total",
        "Total number of authorization decisions",
        &["decision", "result"]
    )
    .unwrap();

    /// Requests currently awaiting a decision
    pub static ref PENDING_REQUESTS: IntGauge = register_int_gauge!(
        "authz_pending_requests",
        "Number of authorization requests awaiting a decision"
    )
    .unwrap();

    // ========== Identity Metrics ==========

    /// Handle lookups by result
    pub static ref HANDLE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "handle_lookups_total",
        "Total number of handle lookups",
        &["result"]
    )
    .unwrap();

    /// Lookup results dropped because the identifier changed
    pub static ref STALE_LOOKUPS_TOTAL: IntCounter = register_int_counter!(
        "handle_lookups_stale_total",
        "Total number of handle lookup results discarded as stale"
    )
    .unwrap();

    // ========== HTTP Metrics ==========

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> AuthzResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AuthzError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| AuthzError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status.to_string()])
        .observe(duration);
}

/// Record an inbound message that was not admitted
pub fn record_rejection(reason: &str) {
    REQUESTS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/requests", 200, 0.05);
        let metrics = render_metrics().unwrap();
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_authorization_metrics_rendered() {
        REQUESTS_ADMITTED_TOTAL.inc();
        record_rejection("malformed");
        DECISIONS_TOTAL.with_label_values(&["deny", "ok"]).inc();
        PENDING_REQUESTS.set(2);

        let metrics = render_metrics().unwrap();
        assert!(metrics.contains("authz_requests_admitted_total"));
        assert!(metrics.contains("authz_requests_rejected_total"));
        assert!(metrics.contains("authz_decisions_total"));
        assert!(metrics.contains("authz_pending_requests"));
    }
}
