//! Liveness probe.

/// Handler for GET /ping
#[tracing::instrument(skip_all, name = "node.ping")]
pub async fn ping() -> &'static str {
    "pong"
}
