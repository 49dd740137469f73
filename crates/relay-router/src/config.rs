//! Router configuration.
//!
//! Configuration is loaded from environment variables. The router's own
//! enrollment secret is not configured here; it lives on disk under
//! `ROUTER_DATA_DIR` (see `services::router_secret`).

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default router identifier reported by `/public/routers`.
pub const DEFAULT_ROUTER_ID: &str = "router-1";

/// Default directory for the registry snapshot and router secret.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Default sticky room mapping lifetime in seconds.
pub const DEFAULT_STICKY_TTL_SECONDS: u64 = 86_400;

/// Default window after the last heartbeat during which a node counts as online.
pub const DEFAULT_NODE_ONLINE_TTL_SECONDS: u64 = 30;

/// Default heartbeat replay window in milliseconds.
pub const DEFAULT_HEARTBEAT_MAX_SKEW_MS: u64 = common::signing::DEFAULT_MAX_SKEW_MS;

/// Default cap on `/nodes` results.
pub const DEFAULT_MAX_NODES_RETURNED: usize = 50;

/// Default validity window of an enrollment challenge in seconds.
pub const DEFAULT_JOIN_CHALLENGE_TTL_SECONDS: u64 = 600;

/// Default lifetime of a minted one-shot join token in seconds.
pub const DEFAULT_OPEN_JOIN_TTL_SECONDS: u64 = 900;

/// Default ceiling on live one-shot join tokens.
pub const DEFAULT_OPEN_JOIN_MAX_TOKENS: usize = 50;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Lower bound applied to TTLs measured in seconds.
pub const MIN_TTL_SECONDS: u64 = 60;

/// Registry snapshot file name within the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "registry.json";

/// Router secret file name within the data directory.
pub const ROUTER_SECRET_FILE_NAME: &str = "router.secret";

/// Router configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Externally reachable base URL, advertised by `/public/routers`.
    pub public_url: Option<String>,

    /// Identifier reported alongside `public_url`.
    pub router_id: String,

    /// Directory holding `registry.json` and `router.secret`.
    pub data_dir: PathBuf,

    /// Sticky room mapping lifetime (floor 60s).
    pub sticky_ttl_seconds: u64,

    /// Seconds since the last heartbeat before a node is considered offline.
    pub node_online_ttl_seconds: u64,

    /// Maximum accepted `|now - ts|` on heartbeats and challenge freshness.
    pub heartbeat_max_skew_ms: u64,

    /// Maximum nodes returned by `/nodes`.
    pub max_nodes_returned: usize,

    /// Enrollment challenge validity window.
    pub join_challenge_ttl_seconds: u64,

    /// Whether `POST /public/join-token` mints one-shot tokens.
    pub open_join: bool,

    /// One-shot token lifetime (floor 60s).
    pub open_join_ttl_seconds: u64,

    /// Ceiling on concurrently live one-shot tokens.
    pub open_join_max_tokens: usize,

    /// Graceful shutdown drain period.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("public_url", &self.public_url)
            .field("router_id", &self.router_id)
            .field("data_dir", &self.data_dir)
            .field("sticky_ttl_seconds", &self.sticky_ttl_seconds)
            .field("node_online_ttl_seconds", &self.node_online_ttl_seconds)
            .field("heartbeat_max_skew_ms", &self.heartbeat_max_skew_ms)
            .field("max_nodes_returned", &self.max_nodes_returned)
            .field(
                "join_challenge_ttl_seconds",
                &self.join_challenge_ttl_seconds,
            )
            .field("open_join", &self.open_join)
            .field("open_join_ttl_seconds", &self.open_join_ttl_seconds)
            .field("open_join_max_tokens", &self.open_join_max_tokens)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let public_url = vars
            .get("ROUTER_PUBLIC_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        let router_id = vars
            .get("ROUTER_ID")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROUTER_ID.to_string());

        let data_dir = vars
            .get("ROUTER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let sticky_ttl_seconds =
            parse_u64(vars, "STICKY_TTL_SECONDS", DEFAULT_STICKY_TTL_SECONDS)?
                .max(MIN_TTL_SECONDS);

        let node_online_ttl_seconds = parse_positive(
            vars,
            "NODE_ONLINE_TTL_SECONDS",
            DEFAULT_NODE_ONLINE_TTL_SECONDS,
        )?;

        let heartbeat_max_skew_ms = parse_positive(
            vars,
            "HEARTBEAT_MAX_SKEW_MS",
            DEFAULT_HEARTBEAT_MAX_SKEW_MS,
        )?;

        let max_nodes_returned = parse_usize(
            vars,
            "MAX_NODES_RETURNED",
            DEFAULT_MAX_NODES_RETURNED,
        )?;

        let join_challenge_ttl_seconds = parse_positive(
            vars,
            "JOIN_CHALLENGE_TTL_SECONDS",
            DEFAULT_JOIN_CHALLENGE_TTL_SECONDS,
        )?;

        let open_join = vars
            .get("OPEN_JOIN")
            .is_some_and(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"));

        let open_join_ttl_seconds =
            parse_u64(vars, "OPEN_JOIN_TTL_SECONDS", DEFAULT_OPEN_JOIN_TTL_SECONDS)?
                .max(MIN_TTL_SECONDS);

        let open_join_max_tokens = parse_usize(
            vars,
            "OPEN_JOIN_MAX_TOKENS",
            DEFAULT_OPEN_JOIN_MAX_TOKENS,
        )?;

        let drain_seconds = parse_u64(vars, "ROUTER_DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)?;

        Ok(Config {
            bind_address,
            public_url,
            router_id,
            data_dir,
            sticky_ttl_seconds,
            node_online_ttl_seconds,
            heartbeat_max_skew_ms,
            max_nodes_returned,
            join_challenge_ttl_seconds,
            open_join,
            open_join_ttl_seconds,
            open_join_max_tokens,
            drain_seconds,
        })
    }

    /// Sticky mapping lifetime in milliseconds.
    pub fn sticky_ttl_ms(&self) -> u64 {
        self.sticky_ttl_seconds.saturating_mul(1000)
    }

    /// Online window in milliseconds.
    pub fn node_online_ttl_ms(&self) -> u64 {
        self.node_online_ttl_seconds.saturating_mul(1000)
    }

    /// Challenge validity window in milliseconds.
    pub fn join_challenge_ttl_ms(&self) -> u64 {
        self.join_challenge_ttl_seconds.saturating_mul(1000)
    }

    /// One-shot token lifetime in milliseconds.
    pub fn open_join_ttl_ms(&self) -> u64 {
        self.open_join_ttl_seconds.saturating_mul(1000)
    }

    /// Path of the durable registry snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE_NAME)
    }

    /// Path of the router enrollment secret.
    pub fn router_secret_path(&self) -> PathBuf {
        self.data_dir.join(ROUTER_SECRET_FILE_NAME)
    }
}

fn parse_u64(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("must be a valid non-negative integer, got '{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = parse_u64(vars, name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(value)
}

fn parse_usize(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("must be a valid non-negative integer, got '{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
