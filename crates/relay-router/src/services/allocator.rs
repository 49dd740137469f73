//! Room allocation.
//!
//! Chooses the node that will host a room and mints the session token the
//! client presents to that node.
//!
//! Selection order:
//! 1. A live sticky mapping for the requested room, if the mapped node is
//!    still known and has a secret.
//! 2. Otherwise the online node with the lowest client-reported latency.
//!    Nodes without a usable latency hint score [`UNKNOWN_LATENCY_SCORE`].
//!    Ties go to the earliest-registered node.
//!
//! The resulting room -> node mapping is always (re)recorded, so a fresh
//! placement becomes sticky for later calls.

use crate::errors::RouterError;
use crate::registry::{NodeRecord, NodeRegistry};
use crate::services::sticky::StickyMap;
use common::signing;
use common::types;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Score given to nodes with no usable latency hint.
pub const UNKNOWN_LATENCY_SCORE: u64 = 999_999;

/// Lower clamp for reported latencies, in milliseconds.
pub const MIN_LATENCY_MS: u64 = 1;

/// Upper clamp for reported latencies, in milliseconds.
pub const MAX_LATENCY_MS: u64 = 120_000;

/// Longest accepted client-supplied room id.
pub const MAX_ROOM_ID_LEN: usize = 128;

/// Outcome of a successful allocation.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub room_id: String,
    pub user_id: String,
    pub token: String,
    pub node_key: String,
    pub base_url: String,
    /// Whether an existing sticky mapping decided the node.
    pub reused_mapping: bool,
}

/// Allocation service over the registry and sticky map.
#[derive(Debug, Clone)]
pub struct Allocator {
    registry: Arc<NodeRegistry>,
    sticky: Arc<StickyMap>,
    online_ttl_ms: u64,
}

impl Allocator {
    pub fn new(registry: Arc<NodeRegistry>, sticky: Arc<StickyMap>, online_ttl_ms: u64) -> Self {
        Self {
            registry,
            sticky,
            online_ttl_ms,
        }
    }

    /// Allocate a node for `room_id` (or a new room) and mint a session token
    /// for a freshly generated user id.
    ///
    /// # Errors
    ///
    /// - `RouterError::NoNodes` - no node is online, even if a sticky mapping exists
    /// - `RouterError::BadRequest` - room id too long
    #[instrument(skip_all, name = "router.allocate", fields(sticky_hit = tracing::field::Empty))]
    pub fn allocate(
        &self,
        room_id: Option<&str>,
        latencies: Option<&HashMap<String, Value>>,
    ) -> Result<Allocation, RouterError> {
        let online = self.registry.list_internal(self.online_ttl_ms);
        if online.is_empty() {
            tracing::warn!(target: "router.allocate", "No online nodes to allocate");
            return Err(RouterError::NoNodes);
        }

        let room_id = normalize_room_id(room_id)?;

        if let Some(room_id) = room_id.as_deref() {
            if let Some(node) = self.sticky_node(room_id) {
                tracing::Span::current().record("sticky_hit", true);
                return Ok(self.finish(room_id.to_string(), &node, true));
            }
        }

        let chosen = select_by_latency(&online, latencies).ok_or(RouterError::NoNodes)?;
        let room_id = room_id.unwrap_or_else(types::new_room_id);

        tracing::Span::current().record("sticky_hit", false);
        Ok(self.finish(room_id, chosen, false))
    }

    fn sticky_node(&self, room_id: &str) -> Option<NodeRecord> {
        let key = self.sticky.get(room_id)?;
        self.registry.get(&key).filter(NodeRecord::has_secret)
    }

    fn finish(&self, room_id: String, node: &NodeRecord, reused_mapping: bool) -> Allocation {
        self.sticky.set(&room_id, &node.key);

        let user_id = types::new_user_id();
        let token = signing::sign_session_token(&node.node_secret, &room_id, &user_id, &node.key);

        tracing::debug!(
            target: "router.allocate",
            room_id = %room_id,
            node_key = %node.key,
            reused_mapping,
            "Room allocated"
        );

        Allocation {
            room_id,
            user_id,
            token,
            node_key: node.key.clone(),
            base_url: node.public_url.clone(),
            reused_mapping,
        }
    }
}

fn normalize_room_id(room_id: Option<&str>) -> Result<Option<String>, RouterError> {
    let Some(trimmed) = room_id.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if trimmed.len() > MAX_ROOM_ID_LEN {
        return Err(RouterError::BadRequest(format!(
            "roomId longer than {MAX_ROOM_ID_LEN} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Pick the lowest-scoring node; the first of equal scores wins.
pub fn select_by_latency<'a>(
    nodes: &'a [NodeRecord],
    latencies: Option<&HashMap<String, Value>>,
) -> Option<&'a NodeRecord> {
    nodes
        .iter()
        .min_by_key(|n| latency_score(latencies.and_then(|l| l.get(&n.key))))
}

/// Score a latency hint. Positive finite numbers (or numeric strings) are
/// rounded and clamped to `[1, 120000]`; anything else is unknown.
pub fn latency_score(hint: Option<&Value>) -> u64 {
    let ms = match hint {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match ms {
        Some(v) if v.is_finite() && v > 0.0 => clamp_latency(v),
        _ => UNKNOWN_LATENCY_SCORE,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn clamp_latency(ms: f64) -> u64 {
    ms.round()
        .clamp(MIN_LATENCY_MS as f64, MAX_LATENCY_MS as f64) as u64
}
