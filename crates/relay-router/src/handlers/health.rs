//! Liveness probe.

/// Handler for GET /ping
#[tracing::instrument(skip_all, name = "router.ping")]
pub async fn ping() -> &'static str {
    "pong"
}
