//! Enrollment handlers.
//!
//! - `GET /.well-known/relay-join` hands out a signed challenge.
//! - `POST /public/join-token` mints a one-shot token, only with `OPEN_JOIN=1`.
//! - `POST /public/join` redeems either credential for node credentials.

use crate::errors::RouterError;
use crate::models::{JoinRequest, JoinResponse, JoinTokenResponse};
use crate::observability::metrics;
use crate::routes::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use common::secret::ExposeSecret;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /.well-known/relay-join
#[instrument(skip_all, name = "router.join.challenge")]
pub async fn join_challenge(State(state): State<Arc<AppState>>) -> Json<JoinTokenResponse> {
    let challenge = state.enrollment.issue_challenge();
    let expires_at = challenge
        .ts
        .saturating_add(state.config.join_challenge_ttl_ms());
    Json(JoinTokenResponse {
        join_token: challenge.to_string(),
        expires_at: Some(expires_at),
    })
}

/// Handler for POST /public/join-token
#[instrument(skip_all, name = "router.join.mint")]
pub async fn mint_join_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JoinTokenResponse>, RouterError> {
    if !state.config.open_join {
        return Err(RouterError::Forbidden("open join is disabled".to_string()));
    }

    let minted = state.enrollment.mint_token(
        state.config.open_join_ttl_ms(),
        state.config.open_join_max_tokens,
    )?;
    metrics::record_join_token_minted();

    Ok(Json(JoinTokenResponse {
        join_token: minted.token.expose_secret().to_string(),
        expires_at: Some(minted.expires_at),
    }))
}

/// Handler for POST /public/join
///
/// The response is the only place a node secret leaves the router.
#[instrument(skip_all, name = "router.join")]
pub async fn join(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<JoinResponse>, RouterError> {
    let Json(req) = payload.map_err(|e| RouterError::BadRequest(e.body_text()))?;
    let (Some(join_token), Some(public_url)) = (req.join_token, req.node_public_url) else {
        metrics::record_enrollment("bad_request");
        return Err(RouterError::BadRequest(
            "joinToken and nodePublicUrl are required".to_string(),
        ));
    };

    match state.enrollment.enroll(&join_token, &public_url) {
        Ok(enrolled) => {
            metrics::record_enrollment("enrolled");
            Ok(Json(JoinResponse {
                node_key: enrolled.node_key,
                node_secret: enrolled.node_secret.expose_secret().to_string(),
            }))
        }
        Err(e) => {
            metrics::record_enrollment(e.code());
            Err(e)
        }
    }
}
