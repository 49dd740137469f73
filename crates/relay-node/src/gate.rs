//! Connection admission.
//!
//! A handshake claims `(room_id, user_id)` and presents the session token the
//! router minted for this node. The gate recomputes the token from its own
//! copy of the node secret; nothing is looked up. Admission into the room
//! happens separately, after the WebSocket upgrade.

use crate::errors::{NodeError, RoomError};
use crate::rooms::{Admission, RoomManager};
use common::secret::SecretString;
use common::signing;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Handshake query parameters. Missing fields fail verification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

/// A handshake whose token matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedSession {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct ConnectionGate {
    node_key: String,
    node_secret: SecretString,
    rooms: Arc<RoomManager>,
}

impl ConnectionGate {
    pub fn new(node_key: String, node_secret: SecretString, rooms: Arc<RoomManager>) -> Self {
        Self {
            node_key,
            node_secret,
            rooms,
        }
    }

    pub fn node_key(&self) -> &str {
        &self.node_key
    }

    /// Check the handshake token.
    ///
    /// # Errors
    ///
    /// `NodeError::Unauthorized` for a missing field or a token mismatch.
    #[instrument(skip_all, name = "node.gate.verify")]
    pub fn verify(&self, handshake: &Handshake) -> Result<AuthorizedSession, NodeError> {
        let field = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let (Some(room_id), Some(user_id), Some(token)) = (
            field(&handshake.room_id),
            field(&handshake.user_id),
            field(&handshake.token),
        ) else {
            return Err(NodeError::Unauthorized(
                "handshake missing roomId, userId or token".to_string(),
            ));
        };

        if !signing::verify_session_token(
            &self.node_secret,
            &room_id,
            &user_id,
            &self.node_key,
            &token,
        ) {
            return Err(NodeError::Unauthorized(format!(
                "token mismatch for {user_id} in {room_id}"
            )));
        }

        Ok(AuthorizedSession { room_id, user_id })
    }

    /// Admit a verified session into its room.
    ///
    /// # Errors
    ///
    /// Capacity errors from `RoomManager::join`.
    pub fn admit(&self, session: &AuthorizedSession) -> Result<Admission, RoomError> {
        self.rooms.join(&session.room_id, &session.user_id)
    }
}
