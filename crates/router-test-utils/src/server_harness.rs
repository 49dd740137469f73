//! Test server harness for E2E testing
//!
//! Provides `TestRouterServer` for spawning real router instances in tests.
//! Each server gets its own temp data directory and a manually driven clock.

use common::clock::{Clock, ManualClock};
use common::secret::SecretString;
use common::signing::HeartbeatFields;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use relay_router::config::Config;
use relay_router::registry::{NewNode, NodeRegistry};
use relay_router::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Start time of every harness clock (2023-11-14T22:13:20Z).
pub const TEST_START_MS: u64 = 1_700_000_000_000;

/// Router secret used by every harness server.
pub const TEST_ROUTER_SECRET: &str = "test-router-secret-0123456789abcdef";

/// Test harness for spawning the relay router in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestRouterServer::spawn().await?;
/// server.add_node("DCN-A", "https://a.example", "secret-a");
/// let body = signed_heartbeat("DCN-A", "https://a.example", "secret-a", 0, 0, TEST_START_MS);
/// ```
pub struct TestRouterServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
    data_dir: TempDir,
    _handle: JoinHandle<()>,
}

impl TestRouterServer {
    /// Spawn a router with default test configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::new()).await
    }

    /// Spawn a router with extra environment-style overrides.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Keep its data under a fresh temp directory
    /// - Read time from a `ManualClock` starting at [`TEST_START_MS`]
    pub async fn spawn_with_vars(
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let data_dir = tempfile::tempdir()
            .map_err(|e| anyhow::anyhow!("Failed to create temp data dir: {}", e))?;

        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("ROUTER_ID".to_string(), "router-test".to_string()),
            (
                "ROUTER_DATA_DIR".to_string(),
                data_dir.path().display().to_string(),
            ),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let clock = Arc::new(ManualClock::new(TEST_START_MS));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let registry = Arc::new(NodeRegistry::load(&config.snapshot_path(), dyn_clock.clone()));

        let state = Arc::new(AppState::new(
            config,
            registry,
            SecretString::from(TEST_ROUTER_SECRET),
            dyn_clock,
        ));

        let app = routes::build_routes(state.clone(), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            clock,
            data_dir,
            _handle: handle,
        })
    }

    /// Get the server's base URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state (registry, sticky map, enrollment).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.state.registry
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// The clock every router store reads.
    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    /// Insert a node directly into the registry, stamped seen now.
    pub fn add_node(&self, key: &str, public_url: &str, secret: &str) {
        self.registry().add(NewNode {
            key: key.to_string(),
            public_url: public_url.to_string(),
            node_secret: SecretString::from(secret),
            last_seen_at: self.clock.now_ms(),
        });
    }
}

impl Drop for TestRouterServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

/// Build a `/register` body signed with `secret`.
pub fn signed_heartbeat(
    node_key: &str,
    public_url: &str,
    secret: &str,
    rooms_active: u64,
    users_active: u64,
    ts: u64,
) -> serde_json::Value {
    let fields = HeartbeatFields {
        node_key,
        public_url,
        rooms_active,
        users_active,
        ts,
    };
    let sig = fields.sign(&SecretString::from(secret));
    serde_json::json!({
        "nodeKey": node_key,
        "publicUrl": public_url,
        "roomsActive": rooms_active,
        "usersActive": users_active,
        "ts": ts,
        "sig": sig,
    })
}

/// A Prometheus handle usable by any number of servers in one process.
///
/// The global recorder can only be installed once; later servers get a
/// detached recorder's handle.
fn test_metrics_handle() -> PrometheusHandle {
    relay_router::observability::metrics::init_metrics_recorder()
        .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
}
