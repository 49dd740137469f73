//! HTTP routes for the router.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::registry::NodeRegistry;
use crate::services::{
    Allocator, EnrollmentIssuer, EnrollmentPolicy, HeartbeatVerifier, StickyMap,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use common::clock::Clock;
use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Node directory.
    pub registry: Arc<NodeRegistry>,

    /// Room to node pinning.
    pub sticky: Arc<StickyMap>,

    pub allocator: Allocator,

    pub heartbeat: HeartbeatVerifier,

    /// Enrollment challenges and one-shot tokens.
    pub enrollment: Arc<EnrollmentIssuer>,

    pub clock: Arc<dyn Clock>,

    /// Process start, epoch milliseconds.
    pub started_at: u64,
}

impl AppState {
    /// Wire the services over an already-loaded registry.
    pub fn new(
        config: Config,
        registry: Arc<NodeRegistry>,
        router_secret: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sticky = Arc::new(StickyMap::new(config.sticky_ttl_ms(), clock.clone()));
        let allocator = Allocator::new(
            registry.clone(),
            sticky.clone(),
            config.node_online_ttl_ms(),
        );
        let heartbeat =
            HeartbeatVerifier::new(registry.clone(), clock.clone(), config.heartbeat_max_skew_ms);
        let enrollment = Arc::new(EnrollmentIssuer::new(
            router_secret,
            registry.clone(),
            clock.clone(),
            EnrollmentPolicy {
                challenge_ttl_ms: config.join_challenge_ttl_ms(),
                max_future_skew_ms: config.heartbeat_max_skew_ms,
            },
        ));
        let started_at = clock.now_ms();

        Self {
            config,
            registry,
            sticky,
            allocator,
            heartbeat,
            enrollment,
            clock,
            started_at,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/ping` - Liveness probe
/// - `/metrics` - Prometheus metrics
/// - `/nodes`, `/register`, `/allocate` - Node directory, heartbeat, allocation
/// - `/.well-known/relay-join`, `/public/join-token`, `/public/join` - Enrollment
/// - `/public/stats`, `/public/routers` - Aggregate discovery
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/nodes", get(handlers::list_nodes))
        .route("/register", post(handlers::register))
        .route("/allocate", post(handlers::allocate))
        .route("/.well-known/relay-join", get(handlers::join_challenge))
        .route("/public/join-token", post(handlers::mint_join_token))
        .route("/public/join", post(handlers::join))
        .route("/public/stats", get(handlers::public_stats))
        .route("/public/routers", get(handlers::public_routers))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees framework rejections too)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_config_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Config>();
    }
}
