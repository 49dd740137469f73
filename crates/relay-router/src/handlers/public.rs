//! Public discovery handlers.

use crate::models::{NetworkStats, RouterInfo, RouterRuntime, RoutersResponse, StatsResponse};
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /public/stats
///
/// Aggregates over online nodes only. A single router reports itself as
/// the only router online.
#[instrument(skip_all, name = "router.public.stats")]
pub async fn public_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let now = state.clock.now_ms();
    let ttl = state.config.node_online_ttl_ms();
    let (rooms_total, users_total) = state.registry.online_activity(ttl);

    Json(StatsResponse {
        ok: true,
        at: now,
        router: RouterRuntime {
            uptime_sec: now.saturating_sub(state.started_at) / 1000,
        },
        network: NetworkStats {
            routers_online: 1,
            nodes_online: state.registry.count_online(ttl) as u64,
            rooms_total,
            users_total,
            sticky_mapped_rooms: state.sticky.live_count() as u64,
        },
    })
}

/// Handler for GET /public/routers
///
/// Empty unless `ROUTER_PUBLIC_URL` is configured.
#[instrument(skip_all, name = "router.public.routers")]
pub async fn public_routers(State(state): State<Arc<AppState>>) -> Json<RoutersResponse> {
    let routers = state
        .config
        .public_url
        .iter()
        .map(|base_url| RouterInfo {
            base_url: base_url.clone(),
            router_id: state.config.router_id.clone(),
            last_seen_min: 0,
        })
        .collect();
    Json(RoutersResponse { ok: true, routers })
}
