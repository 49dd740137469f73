//! Error taxonomy shared by the router and the nodes.
//!
//! Every service-specific error maps onto one of these kinds. The kind's
//! wire string is what callers see; details stay in server-side logs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classes visible across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed fields.
    BadRequest,
    /// Bad signature, bad or unknown token, unknown principal.
    Unauthorized,
    /// A configured ceiling was hit (`room_full`, `rooms_full`, token cap).
    Capacity,
    /// Unknown node or room.
    NotFound,
    /// No node is currently online.
    Upstream,
    /// Timestamp outside the replay window.
    TsSkew,
    /// Durable write failed (never surfaced to the triggering request).
    Persistence,
}

impl ErrorKind {
    /// Returns the wire string for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Capacity => "capacity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Upstream => "upstream",
            ErrorKind::TsSkew => "ts_skew",
            ErrorKind::Persistence => "persistence",
        }
    }

    /// Whether a client may safely retry (re-allocate, pick another node).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Capacity | ErrorKind::NotFound | ErrorKind::Upstream
        )
    }
}

/// Errors from the signing primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// A join challenge did not have the `ts:nonce:sig` shape.
    #[error("Malformed join challenge")]
    MalformedChallenge,
}
