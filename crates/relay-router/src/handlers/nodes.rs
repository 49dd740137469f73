//! Node directory and heartbeat handlers.

use crate::errors::RouterError;
use crate::models::{NodesResponse, OkResponse, RegisterRequest};
use crate::observability::metrics;
use crate::routes::AppState;
use crate::services::Heartbeat;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /nodes
///
/// Online nodes only, in registration order, capped at `MAX_NODES_RETURNED`.
#[instrument(skip_all, name = "router.nodes.list")]
pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<NodesResponse> {
    let nodes = state.registry.list_public(
        state.config.node_online_ttl_ms(),
        state.config.max_nodes_returned,
    );
    Json(NodesResponse { ok: true, nodes })
}

/// Handler for POST /register
///
/// Signed node heartbeat. See [`crate::services::heartbeat`].
#[instrument(skip_all, name = "router.register")]
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, RouterError> {
    let hb = parse_heartbeat(payload).map_err(|e| {
        metrics::record_heartbeat(e.code());
        e
    })?;

    match state.heartbeat.accept(&hb) {
        Ok(()) => {
            metrics::record_heartbeat("accepted");
            Ok(Json(OkResponse::ok()))
        }
        Err(rejection) => {
            metrics::record_heartbeat(rejection.cause());
            Err(rejection.into())
        }
    }
}

fn parse_heartbeat(
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Heartbeat, RouterError> {
    let Json(req) = payload.map_err(|e| RouterError::BadRequest(e.body_text()))?;

    let missing = |field: &str| RouterError::BadRequest(format!("{field} is required"));
    let node_key = req
        .node_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| missing("nodeKey"))?;
    let public_url = req
        .public_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| missing("publicUrl"))?;
    let ts = req.ts.ok_or_else(|| missing("ts"))?;
    let sig = req
        .sig
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("sig"))?;

    Ok(Heartbeat {
        node_key,
        public_url,
        rooms_active: req.rooms_active,
        users_active: req.users_active,
        ts,
        sig,
    })
}
