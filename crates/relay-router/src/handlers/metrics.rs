//! Prometheus scrape endpoint.
//!
//! Unauthenticated. Labels are bounded and carry no node keys or secrets.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
#[tracing::instrument(skip_all, name = "router.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
