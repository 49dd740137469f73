//! Router wire models.
//!
//! Request and response bodies for the router's HTTP surface. Field names
//! are camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Plain `{ "ok": true }` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

// ============================================================================
// Node directory
// ============================================================================

/// A node as seen by clients. Never carries the node secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicNode {
    pub key: String,
    pub public_url: String,
    pub rooms_active: u64,
    pub users_active: u64,
    pub last_seen_at: u64,
    pub online: bool,
}

/// Response for `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesResponse {
    pub ok: bool,
    pub nodes: Vec<PublicNode>,
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Body of `POST /register`.
///
/// Every field is optional at the serde layer so that a missing field is
/// reported as `bad_request` by the handler rather than as a framework error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub node_key: Option<String>,
    pub public_url: Option<String>,
    #[serde(default)]
    pub rooms_active: u64,
    #[serde(default)]
    pub users_active: u64,
    pub ts: Option<u64>,
    pub sig: Option<String>,
}

// ============================================================================
// Allocation
// ============================================================================

/// Body of `POST /allocate`.
///
/// Latency hints map node key to client-measured round trip in milliseconds.
/// Values may be numbers or numeric strings; anything else scores as unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    pub room_id: Option<String>,
    #[serde(default)]
    pub latencies: Option<HashMap<String, serde_json::Value>>,
}

/// Node coordinates returned with an allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedNode {
    pub key: String,
    pub base_url: String,
}

/// Response for `POST /allocate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateResponse {
    pub ok: bool,
    pub sticky: bool,
    pub room_id: String,
    pub user_id: String,
    pub token: String,
    pub node: AllocatedNode,
}

// ============================================================================
// Enrollment
// ============================================================================

/// Response for `GET /.well-known/relay-join` and `POST /public/join-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTokenResponse {
    pub join_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Body of `POST /public/join`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub join_token: Option<String>,
    pub node_public_url: Option<String>,
}

/// Response for `POST /public/join`. This is the only place a node secret
/// leaves the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub node_key: String,
    pub node_secret: String,
}

// ============================================================================
// Public discovery
// ============================================================================

/// One entry of `GET /public/routers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterInfo {
    pub base_url: String,
    pub router_id: String,
    pub last_seen_min: u64,
}

/// Response for `GET /public/routers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutersResponse {
    pub ok: bool,
    pub routers: Vec<RouterInfo>,
}

/// Router process figures in `/public/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterRuntime {
    pub uptime_sec: u64,
}

/// Network aggregate in `/public/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub routers_online: u64,
    pub nodes_online: u64,
    pub rooms_total: u64,
    pub users_total: u64,
    pub sticky_mapped_rooms: u64,
}

/// Response for `GET /public/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub ok: bool,
    pub at: u64,
    pub router: RouterRuntime,
    pub network: NetworkStats,
}
