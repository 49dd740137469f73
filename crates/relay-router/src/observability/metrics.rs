//! Router metrics.
//!
//! Naming follows Prometheus conventions: `relay_router_` prefix, `_total`
//! for counters, `_seconds` for duration histograms.
//!
//! # Cardinality
//!
//! Every label is bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: the fixed route table, everything else is `/other`
//! - `outcome`: wire error codes, heartbeat rejection causes
//!   (`unknown_node`, `bad_sig`, `ts_skew`) or `accepted`/`allocated`/`enrolled`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Fails if bucket configuration is rejected or a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("relay_router_http_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("relay_router_registry_flush".to_string()),
            &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000],
        )
        .map_err(|e| format!("Failed to set registry flush buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP
// ============================================================================

/// Record a completed HTTP request.
///
/// Metric: `relay_router_http_requests_total`, `relay_router_http_request_duration_seconds`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("relay_router_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("relay_router_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/ping" => "/ping",
        "/nodes" => "/nodes",
        "/register" => "/register",
        "/allocate" => "/allocate",
        "/metrics" => "/metrics",
        "/.well-known/relay-join" => "/.well-known/relay-join",
        "/public/join" => "/public/join",
        "/public/join-token" => "/public/join-token",
        "/public/stats" => "/public/stats",
        "/public/routers" => "/public/routers",
        _ => "/other",
    }
}

// ============================================================================
// Protocol
// ============================================================================

/// Metric: `relay_router_heartbeats_total{outcome}`
pub fn record_heartbeat(outcome: &'static str) {
    counter!("relay_router_heartbeats_total", "outcome" => outcome).increment(1);
}

/// Metric: `relay_router_allocations_total{outcome, sticky}`
pub fn record_allocation(outcome: &'static str, sticky_hit: bool) {
    counter!("relay_router_allocations_total",
        "outcome" => outcome,
        "sticky" => if sticky_hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Metric: `relay_router_enrollments_total{outcome}`
pub fn record_enrollment(outcome: &'static str) {
    counter!("relay_router_enrollments_total", "outcome" => outcome).increment(1);
}

/// Metric: `relay_router_join_tokens_minted_total`
pub fn record_join_token_minted() {
    counter!("relay_router_join_tokens_minted_total").increment(1);
}

// ============================================================================
// State gauges
// ============================================================================

/// Metric: `relay_router_nodes_online`, `relay_router_nodes_known`
#[allow(clippy::cast_precision_loss)]
pub fn set_node_counts(online: usize, known: usize) {
    gauge!("relay_router_nodes_online").set(online as f64);
    gauge!("relay_router_nodes_known").set(known as f64);
}

/// Metric: `relay_router_sticky_rooms`
#[allow(clippy::cast_precision_loss)]
pub fn set_sticky_rooms(count: usize) {
    gauge!("relay_router_sticky_rooms").set(count as f64);
}

/// Metric: `relay_router_registry_flush_duration_seconds`, `relay_router_registry_flushes_total{status}`
pub fn record_registry_flush(status: &'static str, duration: Duration) {
    histogram!("relay_router_registry_flush_duration_seconds").record(duration.as_secs_f64());
    counter!("relay_router_registry_flushes_total", "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed here; these exercise the recording paths only.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/ping", 200, Duration::from_millis(1));
        record_http_request("POST", "/allocate", 503, Duration::from_millis(3));
        record_http_request("GET", "/nope/abc", 404, Duration::from_millis(1));
    }

    #[test]
    fn test_normalize_endpoint_bounds_cardinality() {
        assert_eq!(normalize_endpoint("/register"), "/register");
        assert_eq!(normalize_endpoint("/public/stats"), "/public/stats");
        assert_eq!(normalize_endpoint("/R-abc123"), "/other");
        assert_eq!(normalize_endpoint("/nodes/extra"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(503), "error");
    }

    #[test]
    fn test_protocol_counters() {
        record_heartbeat("accepted");
        record_heartbeat("ts_skew");
        record_allocation("allocated", true);
        record_allocation("no_nodes", false);
        record_enrollment("enrolled");
        record_join_token_minted();
        set_node_counts(2, 5);
        set_sticky_rooms(7);
        record_registry_flush("success", Duration::from_millis(2));
    }
}
