//! Router HTTP client.
//!
//! The node talks to the router for two things: enrollment (once, at first
//! boot) and signed heartbeats (forever after).
//!
//! Non-2xx replies become `NodeError::Router` carrying the router's error
//! code; transport failures become `NodeError::Http`.

use crate::errors::NodeError;
use common::secret::{ExposeSecret, SecretString};
use common::signing::HeartbeatFields;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Per-request timeout.
const ROUTER_REQUEST_TIMEOUT_SECS: u64 = 10;

const ROUTER_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Challenge handed out by `GET /.well-known/relay-join`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChallengeResponse {
    pub join_token: String,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest<'a> {
    join_token: &'a str,
    node_public_url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse {
    node_key: String,
    node_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    node_key: &'a str,
    public_url: &'a str,
    rooms_active: u64,
    users_active: u64,
    ts: u64,
    sig: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Heartbeat contents before signing.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatReport {
    pub rooms_active: u64,
    pub users_active: u64,
    pub ts: u64,
}

#[derive(Clone)]
pub struct RouterClient {
    client: Client,
    /// Router base URL, no trailing slash.
    base_url: String,
}

impl std::fmt::Debug for RouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RouterClient {
    /// # Errors
    ///
    /// Returns `NodeError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(ROUTER_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(ROUTER_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "node.router_client", error = %e, "Failed to build HTTP client");
                NodeError::Internal("failed to build HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a fresh enrollment challenge.
    #[instrument(skip_all, name = "node.router.challenge")]
    pub async fn fetch_challenge(&self) -> Result<JoinChallengeResponse, NodeError> {
        let url = format!("{}/.well-known/relay-join", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }

    /// Redeem a challenge or one-shot token for node credentials.
    #[instrument(skip_all, name = "node.router.enroll", fields(public_url = %public_url))]
    pub async fn enroll(
        &self,
        join_token: &SecretString,
        public_url: &str,
    ) -> Result<(String, SecretString), NodeError> {
        let url = format!("{}/public/join", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&JoinRequest {
                join_token: join_token.expose_secret(),
                node_public_url: public_url,
            })
            .send()
            .await?;

        let joined: JoinResponse = Self::parse(response).await?;
        Ok((joined.node_key, SecretString::from(joined.node_secret)))
    }

    /// Post a heartbeat signed with the node secret.
    #[instrument(skip_all, name = "node.router.heartbeat", fields(node_key = %node_key))]
    pub async fn send_heartbeat(
        &self,
        node_key: &str,
        node_secret: &SecretString,
        public_url: &str,
        report: HeartbeatReport,
    ) -> Result<(), NodeError> {
        let fields = HeartbeatFields {
            node_key,
            public_url,
            rooms_active: report.rooms_active,
            users_active: report.users_active,
            ts: report.ts,
        };
        let body = RegisterRequest {
            node_key,
            public_url,
            rooms_active: report.rooms_active,
            users_active: report.users_active,
            ts: report.ts,
            sig: fields.sign(node_secret),
        };

        let url = format!("{}/register", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> Result<(), NodeError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::rejection(response).await)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NodeError> {
        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        response.json().await.map_err(|e| {
            warn!(target: "node.router_client", error = %e, "Failed to parse router response");
            NodeError::Http(e)
        })
    }

    async fn rejection(response: reqwest::Response) -> NodeError {
        let status = response.status().as_u16();
        let code = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| "unknown".to_string());
        warn!(target: "node.router_client", status, code = %code, "Router rejected request");
        NodeError::Router { status, code }
    }
}
