//! Router error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl and render
//! as `{"ok": false, "error": "<code>"}`. The code is the only detail a caller
//! sees; the reason carried by each variant is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::ErrorKind;
use serde::Serialize;
use thiserror::Error;

/// Router error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400
/// - Unauthorized, TsSkew: 401
/// - Forbidden: 403
/// - NotFound: 404
/// - Capacity: 429
/// - NoNodes: 503
/// - Internal: 500
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown node, bad signature or bad enrollment credential. Callers
    /// cannot tell these apart.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timestamp outside replay window: skew {skew_ms}ms")]
    TsSkew { skew_ms: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("No nodes online")]
    NoNodes,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RouterError::BadRequest(_) => 400,
            RouterError::Unauthorized(_) | RouterError::TsSkew { .. } => 401,
            RouterError::Forbidden(_) => 403,
            RouterError::NotFound(_) => 404,
            RouterError::Capacity(_) => 429,
            RouterError::NoNodes => 503,
            RouterError::Internal(_) => 500,
        }
    }

    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::BadRequest(_) => "bad_request",
            RouterError::Unauthorized(_) => "unauthorized",
            RouterError::TsSkew { .. } => "ts_skew",
            RouterError::NotFound(_) => "not_found",
            RouterError::Capacity(_) => "capacity",
            RouterError::NoNodes => "no_nodes",
            RouterError::Forbidden(_) => "forbidden",
            RouterError::Internal(_) => "internal",
        }
    }

    /// Shared taxonomy class, where one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RouterError::BadRequest(_) => Some(ErrorKind::BadRequest),
            RouterError::Unauthorized(_) => Some(ErrorKind::Unauthorized),
            RouterError::TsSkew { .. } => Some(ErrorKind::TsSkew),
            RouterError::NotFound(_) => Some(ErrorKind::NotFound),
            RouterError::Capacity(_) => Some(ErrorKind::Capacity),
            RouterError::NoNodes => Some(ErrorKind::Upstream),
            RouterError::Forbidden(_) | RouterError::Internal(_) => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: &'static str,
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        match &self {
            RouterError::Internal(reason) => {
                tracing::error!(target: "router.errors", reason = %reason, "Internal error");
            }
            RouterError::Unauthorized(reason) => {
                tracing::warn!(target: "router.errors", reason = %reason, "Request rejected");
            }
            other => {
                tracing::debug!(target: "router.errors", error = %other, "Request failed");
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: RouterError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RouterError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(RouterError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(RouterError::TsSkew { skew_ms: 1 }.status_code(), 401);
        assert_eq!(RouterError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(RouterError::NotFound("x".into()).status_code(), 404);
        assert_eq!(RouterError::Capacity("x".into()).status_code(), 429);
        assert_eq!(RouterError::NoNodes.status_code(), 503);
        assert_eq!(RouterError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_no_nodes_is_retryable_upstream() {
        let kind = RouterError::NoNodes.kind().unwrap();
        assert_eq!(kind, ErrorKind::Upstream);
        assert!(kind.is_retryable());
    }

    #[tokio::test]
    async fn test_unauthorized_body_hides_reason() {
        let (status, body) =
            response_parts(RouterError::Unauthorized("unknown node DCN-123".into())).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "unauthorized");
        assert!(!body.to_string().contains("DCN-123"));
    }

    #[tokio::test]
    async fn test_ts_skew_body() {
        let (status, body) = response_parts(RouterError::TsSkew { skew_ms: 61_000 }).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "ts_skew");
    }

    #[tokio::test]
    async fn test_no_nodes_body() {
        let (status, body) = response_parts(RouterError::NoNodes).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "no_nodes");
    }

    #[tokio::test]
    async fn test_internal_body_is_generic() {
        let (status, body) =
            response_parts(RouterError::Internal("disk on fire".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal");
        assert!(!body.to_string().contains("disk"));
    }
}
