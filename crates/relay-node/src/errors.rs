//! Node error types.
//!
//! `NodeError` covers boot, router I/O and HTTP rejections. `RoomError` is
//! the admission outcome surfaced to clients in an `error_msg` frame.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::ErrorKind;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Transport failure talking to the router.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The router answered with a non-success status.
    #[error("Router rejected request: {status} {code}")]
    Router { status: u16, code: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Handshake failed verification. Reason is logged only.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodeError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            NodeError::Unauthorized(_) => 401,
            NodeError::Router { .. } | NodeError::Http(_) => 502,
            NodeError::Config(_) | NodeError::Io(_) | NodeError::Internal(_) => 500,
        }
    }

    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::Unauthorized(_) => ErrorKind::Unauthorized.as_str(),
            NodeError::Router { .. } | NodeError::Http(_) => ErrorKind::Upstream.as_str(),
            NodeError::Config(_) | NodeError::Io(_) | NodeError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: &'static str,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        match &self {
            NodeError::Unauthorized(reason) => {
                tracing::warn!(target: "node.errors", reason = %reason, "Handshake rejected");
            }
            other => {
                tracing::error!(target: "node.errors", error = %other, "Request failed");
            }
        }

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (
            status,
            Json(ErrorResponse {
                ok: false,
                error: self.code(),
            }),
        )
            .into_response()
    }
}

/// Room admission failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    /// Member ceiling reached and the user is not already in the room.
    #[error("Room is full")]
    RoomFull,

    /// Room ceiling reached and the room does not exist yet.
    #[error("Node has no room for another room")]
    RoomsFull,
}

impl RoomError {
    /// Wire error code, sent in `error_msg` frames.
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::BadRequest(_) => "bad_request",
            RoomError::RoomFull => "room_full",
            RoomError::RoomsFull => "rooms_full",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::BadRequest(_) => ErrorKind::BadRequest,
            RoomError::RoomFull | RoomError::RoomsFull => ErrorKind::Capacity,
        }
    }
}
