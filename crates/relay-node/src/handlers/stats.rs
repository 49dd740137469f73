//! Node stats, served as `/public/stats` and on the operator listener as `/stats`.

use crate::rooms::RoomStats;
use crate::routes::AppState;
use crate::system_info::gather_runtime_info;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    pub key: String,
    pub public_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRuntime {
    pub uptime_sec: u64,
    pub loadavg: [f64; 3],
    pub rss_mb: u64,
}

#[derive(Debug, Serialize)]
pub struct NodeStatsResponse {
    pub ok: bool,
    pub at: u64,
    pub node: NodeIdentity,
    pub runtime: NodeRuntime,
    pub activity: RoomStats,
}

/// Handler for GET /public/stats and GET /stats
#[instrument(skip_all, name = "node.stats")]
pub async fn node_stats(State(state): State<Arc<AppState>>) -> Json<NodeStatsResponse> {
    let now = state.clock.now_ms();
    let runtime = gather_runtime_info();

    Json(NodeStatsResponse {
        ok: true,
        at: now,
        node: NodeIdentity {
            key: state.node_key.clone(),
            public_url: state.public_url.clone(),
        },
        runtime: NodeRuntime {
            uptime_sec: now.saturating_sub(state.started_at) / 1000,
            loadavg: runtime.loadavg,
            rss_mb: runtime.rss_mb,
        },
        activity: state.rooms.stats(),
    })
}
