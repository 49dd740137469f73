//! Heartbeat verification.
//!
//! A node reports liveness and activity by posting a body signed with its
//! own secret. Checks run in order: known node, timestamp within the replay
//! window, signature. Only then is the registry touched.
//!
//! Unknown nodes and bad signatures are both `unauthorized` on the wire;
//! the distinction survives only in logs and the heartbeat outcome metric.

use crate::errors::RouterError;
use crate::registry::{ActivityReport, NodeRegistry};
use common::clock::Clock;
use common::signing::{self, HeartbeatFields};
use std::sync::Arc;
use tracing::instrument;

/// A heartbeat with all required fields present.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub node_key: String,
    pub public_url: String,
    pub rooms_active: u64,
    pub users_active: u64,
    pub ts: u64,
    pub sig: String,
}

/// Why a heartbeat was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatRejection {
    /// Key not in the registry, or registered without a secret.
    UnknownNode(String),
    TsSkew { skew_ms: u64 },
    BadSig(String),
}

impl HeartbeatRejection {
    /// Metric label for the rejection.
    pub fn cause(&self) -> &'static str {
        match self {
            HeartbeatRejection::UnknownNode(_) => "unknown_node",
            HeartbeatRejection::TsSkew { .. } => "ts_skew",
            HeartbeatRejection::BadSig(_) => "bad_sig",
        }
    }
}

impl From<HeartbeatRejection> for RouterError {
    fn from(rejection: HeartbeatRejection) -> Self {
        match rejection {
            HeartbeatRejection::UnknownNode(key) => {
                RouterError::Unauthorized(format!("unknown node {key}"))
            }
            HeartbeatRejection::TsSkew { skew_ms } => RouterError::TsSkew { skew_ms },
            HeartbeatRejection::BadSig(key) => {
                RouterError::Unauthorized(format!("bad heartbeat signature from {key}"))
            }
        }
    }
}

/// Verifies heartbeats and records them in the registry.
#[derive(Debug, Clone)]
pub struct HeartbeatVerifier {
    registry: Arc<NodeRegistry>,
    clock: Arc<dyn Clock>,
    max_skew_ms: u64,
}

impl HeartbeatVerifier {
    pub fn new(registry: Arc<NodeRegistry>, clock: Arc<dyn Clock>, max_skew_ms: u64) -> Self {
        Self {
            registry,
            clock,
            max_skew_ms,
        }
    }

    /// Verify `hb` and, on success, mark the node seen with its reported
    /// activity.
    ///
    /// # Errors
    ///
    /// - `HeartbeatRejection::UnknownNode` - unknown node or node without secret
    /// - `HeartbeatRejection::TsSkew` - `|now - ts|` beyond the replay window
    /// - `HeartbeatRejection::BadSig` - signature mismatch
    #[instrument(skip_all, name = "router.heartbeat", fields(node_key = %hb.node_key))]
    pub fn accept(&self, hb: &Heartbeat) -> Result<(), HeartbeatRejection> {
        let node = self
            .registry
            .get(&hb.node_key)
            .filter(|n| n.has_secret())
            .ok_or_else(|| HeartbeatRejection::UnknownNode(hb.node_key.clone()))?;

        let now = self.clock.now_ms();
        if !signing::within_skew(now, hb.ts, self.max_skew_ms) {
            return Err(HeartbeatRejection::TsSkew {
                skew_ms: now.abs_diff(hb.ts),
            });
        }

        let fields = HeartbeatFields {
            node_key: &hb.node_key,
            public_url: &hb.public_url,
            rooms_active: hb.rooms_active,
            users_active: hb.users_active,
            ts: hb.ts,
        };
        if !fields.verify(&node.node_secret, &hb.sig) {
            return Err(HeartbeatRejection::BadSig(hb.node_key.clone()));
        }

        let updated = self.registry.mark_seen(
            &hb.node_key,
            ActivityReport {
                public_url: Some(hb.public_url.clone()),
                rooms_active: Some(hb.rooms_active),
                users_active: Some(hb.users_active),
            },
        );
        if !updated {
            return Err(HeartbeatRejection::UnknownNode(hb.node_key.clone()));
        }

        tracing::debug!(
            target: "router.heartbeat",
            node_key = %hb.node_key,
            rooms_active = hb.rooms_active,
            users_active = hb.users_active,
            "Heartbeat accepted"
        );
        Ok(())
    }
}
