//! HTTP routes for the node.
//!
//! Two listeners share one `AppState`: the public listener terminates client
//! WebSockets, the operator listener serves LAN-only stats.

use crate::credentials::NodeCredentials;
use crate::gate::ConnectionGate;
use crate::handlers;
use crate::rooms::RoomManager;
use axum::{routing::get, Router};
use common::clock::Clock;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub node_key: String,

    /// Advertised base URL.
    pub public_url: String,

    pub rooms: Arc<RoomManager>,

    /// Session token verification and admission.
    pub gate: ConnectionGate,

    pub clock: Arc<dyn Clock>,

    /// Process start, epoch milliseconds.
    pub started_at: u64,

    /// Cancelled on shutdown; open sessions close when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        credentials: &NodeCredentials,
        public_url: String,
        rooms: Arc<RoomManager>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        let gate = ConnectionGate::new(
            credentials.node_key.clone(),
            credentials.node_secret.clone(),
            rooms.clone(),
        );
        let started_at = clock.now_ms();

        Self {
            node_key: credentials.node_key.clone(),
            public_url,
            rooms,
            gate,
            clock,
            started_at,
            shutdown,
        }
    }
}

/// Build the public routes.
///
/// - `/ping` - Liveness probe
/// - `/ws` - Client WebSocket
/// - `/public/stats` - Activity counts for aggregation
/// - `/metrics` - Prometheus metrics
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/ws", get(handlers::ws_handler))
        .route("/public/stats", get(handlers::node_stats))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // The timeout bounds the upgrade handshake only; sessions run detached.
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

/// Build the operator (LAN) routes: `/stats` and `/ping`.
pub fn build_operator_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/stats", get(handlers::node_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rooms::RoomLimits;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::clock::ManualClock;
    use common::secret::SecretString;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000_000));
        let rooms = Arc::new(RoomManager::new(
            RoomLimits {
                max_rooms: 10,
                max_users_per_room: 10,
                idle_ttl_ms: 60_000,
            },
            clock.clone(),
        ));
        let credentials = NodeCredentials {
            node_key: "DCN-0123456789AB".to_string(),
            node_secret: SecretString::from("route-test-secret"),
        };
        Arc::new(AppState::new(
            &credentials,
            "https://node.example".to_string(),
            rooms,
            clock,
            CancellationToken::new(),
        ))
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_unsigned_ws_request_is_unauthorized() {
        let app = build_routes(
            state(),
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        );

        let (status, body) = fetch(app, "/ws?roomId=R-1&userId=U-1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_operator_routes_serve_stats_only() {
        let state = state();
        state.rooms.join("R-1", "U-1").unwrap();

        let (status, body) = fetch(build_operator_routes(state.clone()), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["node"]["key"], "DCN-0123456789AB");
        assert_eq!(body["activity"]["users"], 1);

        let (status, _) = fetch(build_operator_routes(state), "/ws").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
