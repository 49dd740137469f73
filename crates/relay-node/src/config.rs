//! Node configuration.
//!
//! Configuration is loaded from environment variables. The node secret and
//! join token are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default public (client-facing) bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default operator (LAN) bind address.
pub const DEFAULT_OPERATOR_BIND_ADDRESS: &str = "0.0.0.0:9090";

/// Default directory for `node.credentials.json`.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Default idle lifetime of a room.
pub const DEFAULT_ROOM_IDLE_TTL_SECONDS: u64 = 600;

/// Default room sweep interval.
pub const DEFAULT_ROOM_SWEEP_INTERVAL_SECONDS: u64 = 20;

/// Default members-per-room ceiling.
pub const DEFAULT_MAX_USERS_PER_ROOM: usize = 10;

/// Default rooms-per-node ceiling.
pub const DEFAULT_MAX_ROOMS: usize = 500;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 20;

/// Default graceful shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

pub const MIN_ROOM_IDLE_TTL_SECONDS: u64 = 60;
pub const MIN_ROOM_SWEEP_INTERVAL_SECONDS: u64 = 5;
pub const MIN_USERS_PER_ROOM: usize = 2;
pub const MIN_ROOMS: usize = 10;
pub const MIN_HEARTBEAT_INTERVAL_SECONDS: u64 = 5;

/// File holding enrolled credentials under the data directory.
pub const CREDENTIALS_FILE_NAME: &str = "node.credentials.json";

/// Node configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL clients use to reach this node. Signed into heartbeats.
    pub public_url: String,

    /// Router base URL, without trailing slash.
    pub router_url: String,

    /// Pre-provisioned node key. Set together with `node_secret` or not at all.
    pub node_key: Option<String>,

    /// Pre-provisioned node secret.
    pub node_secret: Option<SecretString>,

    /// One-shot enrollment token used instead of a fetched challenge.
    pub join_token: Option<SecretString>,

    pub data_dir: PathBuf,

    /// Public listener (WebSocket, `/public/stats`).
    pub bind_address: String,

    /// Operator listener (`/stats`).
    pub operator_bind_address: String,

    /// Seconds of inactivity before the sweep reclaims a room (floor 60).
    pub room_idle_ttl_seconds: u64,

    /// Room sweep period (floor 5).
    pub room_sweep_interval_seconds: u64,

    /// Members-per-room ceiling (floor 2).
    pub max_users_per_room: usize,

    /// Rooms-per-node ceiling (floor 10).
    pub max_rooms: usize,

    /// Heartbeat period (floor 5).
    pub heartbeat_interval_seconds: u64,

    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("public_url", &self.public_url)
            .field("router_url", &self.router_url)
            .field("node_key", &self.node_key)
            .field(
                "node_secret",
                &self.node_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("join_token", &self.join_token.as_ref().map(|_| "[REDACTED]"))
            .field("data_dir", &self.data_dir)
            .field("bind_address", &self.bind_address)
            .field("operator_bind_address", &self.operator_bind_address)
            .field("room_idle_ttl_seconds", &self.room_idle_ttl_seconds)
            .field(
                "room_sweep_interval_seconds",
                &self.room_sweep_interval_seconds,
            )
            .field("max_users_per_room", &self.max_users_per_room)
            .field("max_rooms", &self.max_rooms)
            .field(
                "heartbeat_interval_seconds",
                &self.heartbeat_interval_seconds,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let public_url = required_url(vars, "NODE_PUBLIC_URL")?;
        let router_url = required_url(vars, "ROUTER_URL")?;

        let node_key = non_empty(vars, "NODE_KEY");
        let node_secret = non_empty(vars, "NODE_SECRET").map(SecretString::from);
        if node_key.is_some() != node_secret.is_some() {
            return Err(ConfigError::InvalidValue {
                name: "NODE_KEY",
                reason: "NODE_KEY and NODE_SECRET must be set together".to_string(),
            });
        }

        let join_token = non_empty(vars, "NODE_JOIN_TOKEN").map(SecretString::from);

        let data_dir = vars
            .get("NODE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let bind_address = vars
            .get("NODE_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let operator_bind_address = vars
            .get("OPERATOR_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_OPERATOR_BIND_ADDRESS.to_string());

        let room_idle_ttl_seconds =
            parse_num(vars, "ROOM_IDLE_TTL_SECONDS", DEFAULT_ROOM_IDLE_TTL_SECONDS)?
                .max(MIN_ROOM_IDLE_TTL_SECONDS);

        let room_sweep_interval_seconds = parse_num(
            vars,
            "ROOM_SWEEP_INTERVAL_SECONDS",
            DEFAULT_ROOM_SWEEP_INTERVAL_SECONDS,
        )?
        .max(MIN_ROOM_SWEEP_INTERVAL_SECONDS);

        let max_users_per_room =
            parse_num(vars, "MAX_USERS_PER_ROOM", DEFAULT_MAX_USERS_PER_ROOM)?
                .max(MIN_USERS_PER_ROOM);

        let max_rooms = parse_num(vars, "MAX_ROOMS", DEFAULT_MAX_ROOMS)?.max(MIN_ROOMS);

        let heartbeat_interval_seconds = parse_num(
            vars,
            "HEARTBEAT_INTERVAL_SECONDS",
            DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
        )?
        .max(MIN_HEARTBEAT_INTERVAL_SECONDS);

        let drain_seconds = parse_num(vars, "NODE_DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)?;

        Ok(Config {
            public_url,
            router_url,
            node_key,
            node_secret,
            join_token,
            data_dir,
            bind_address,
            operator_bind_address,
            room_idle_ttl_seconds,
            room_sweep_interval_seconds,
            max_users_per_room,
            max_rooms,
            heartbeat_interval_seconds,
            drain_seconds,
        })
    }

    pub fn room_idle_ttl_ms(&self) -> u64 {
        self.room_idle_ttl_seconds.saturating_mul(1000)
    }

    /// Path of the persisted enrollment credentials.
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE_NAME)
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_url(vars: &HashMap<String, String>, name: &'static str) -> Result<String, ConfigError> {
    let url = non_empty(vars, name).ok_or(ConfigError::MissingEnvVar(name))?;
    let url = url.trim_end_matches('/').to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            name,
            reason: format!("must be an http(s) URL, got '{url}'"),
        });
    }
    Ok(url)
}

fn parse_num<T>(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("must be a valid non-negative integer, got '{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
