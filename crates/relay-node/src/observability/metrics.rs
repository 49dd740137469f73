//! Node metrics.
//!
//! `relay_node_` prefix. Labels are bounded: `outcome` is `admitted`,
//! `accepted` or a wire error code. Room and user ids never appear.

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
            Matcher::Full("relay_node_session_duration_seconds".to_string()),
            &[1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 14400.0],
        )
        .map_err(|e| format!("Failed to set session duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Metric: `relay_node_connections_total{outcome}`
pub fn record_connection(outcome: &'static str) {
    counter!("relay_node_connections_total", "outcome" => outcome).increment(1);
}

/// Metric: `relay_node_session_duration_seconds`
pub fn record_session_closed(duration: Duration) {
    histogram!("relay_node_session_duration_seconds").record(duration.as_secs_f64());
}

/// Metric: `relay_node_messages_relayed_total`
pub fn record_message_relayed() {
    counter!("relay_node_messages_relayed_total").increment(1);
}

/// Metric: `relay_node_rooms_reclaimed_total`
pub fn record_rooms_reclaimed(count: usize) {
    counter!("relay_node_rooms_reclaimed_total").increment(count as u64);
}

/// Metric: `relay_node_rooms_active`, `relay_node_users_active`
#[allow(clippy::cast_precision_loss)]
pub fn set_activity(rooms: usize, users: usize) {
    gauge!("relay_node_rooms_active").set(rooms as f64);
    gauge!("relay_node_users_active").set(users as f64);
}

/// Metric: `relay_node_heartbeats_total{outcome}`
pub fn record_heartbeat(outcome: &'static str) {
    counter!("relay_node_heartbeats_total", "outcome" => outcome).increment(1);
}
