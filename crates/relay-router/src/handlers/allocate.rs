//! Allocation handler.

use crate::errors::RouterError;
use crate::models::{AllocateRequest, AllocateResponse, AllocatedNode};
use crate::observability::metrics;
use crate::routes::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /allocate
///
/// An empty body allocates a fresh room with no latency hints.
///
/// ## Example Response
///
/// ```json
/// {
///   "ok": true,
///   "sticky": true,
///   "roomId": "R-3F9A0C12BE",
///   "userId": "U-77D1A0E4",
///   "token": "9c1f...",
///   "node": { "key": "DCN-0A1B2C3D4E5F", "baseUrl": "https://node-a.example" }
/// }
/// ```
#[instrument(skip_all, name = "router.allocate.http")]
pub async fn allocate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AllocateResponse>, RouterError> {
    let req: AllocateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AllocateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| RouterError::BadRequest(e.to_string()))?
    };

    let allocation = match state
        .allocator
        .allocate(req.room_id.as_deref(), req.latencies.as_ref())
    {
        Ok(a) => a,
        Err(e) => {
            metrics::record_allocation(e.code(), false);
            return Err(e);
        }
    };
    metrics::record_allocation("allocated", allocation.reused_mapping);

    Ok(Json(AllocateResponse {
        ok: true,
        sticky: true,
        room_id: allocation.room_id,
        user_id: allocation.user_id,
        token: allocation.token,
        node: AllocatedNode {
            key: allocation.node_key,
            base_url: allocation.base_url,
        },
    }))
}
