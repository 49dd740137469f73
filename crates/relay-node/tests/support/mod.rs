//! Shared helpers for node integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use common::clock::{Clock, ManualClock};
use common::secret::SecretString;
use common::signing;
use futures::{SinkExt, StreamExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_node::credentials::NodeCredentials;
use relay_node::rooms::{RoomLimits, RoomManager};
use relay_node::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const TEST_START_MS: u64 = 1_700_000_000_000;
pub const TEST_NODE_KEY: &str = "DCN-7E57000000AA";
pub const TEST_NODE_SECRET: &str = "test-node-secret-0123456789abcdef";

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A node serving its public routes on an ephemeral port.
pub struct TestNode {
    pub addr: SocketAddr,
    pub operator_addr: SocketAddr,
    pub state: Arc<AppState>,
    pub rooms: Arc<RoomManager>,
    pub clock: Arc<ManualClock>,
    pub shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TestNode {
    pub async fn spawn(limits: RoomLimits) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let clock = Arc::new(ManualClock::new(TEST_START_MS));
        let creds = NodeCredentials {
            node_key: TEST_NODE_KEY.to_string(),
            node_secret: SecretString::from(TEST_NODE_SECRET),
        };
        Self::spawn_on(listener, creds, limits, clock).await
    }

    /// Serve on an already-bound listener, e.g. when the public URL had to
    /// be known before enrollment.
    pub async fn spawn_on(
        listener: TcpListener,
        creds: NodeCredentials,
        limits: RoomLimits,
        clock: Arc<ManualClock>,
    ) -> anyhow::Result<Self> {
        let addr = listener.local_addr()?;
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let rooms = Arc::new(RoomManager::new(limits, dyn_clock.clone()));
        let shutdown = CancellationToken::new();

        let state = Arc::new(AppState::new(
            &creds,
            format!("http://{addr}"),
            rooms.clone(),
            dyn_clock,
            shutdown.clone(),
        ));

        let app = routes::build_routes(
            state.clone(),
            PrometheusBuilder::new().build_recorder().handle(),
        );
        let public = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let operator_listener = TcpListener::bind("127.0.0.1:0").await?;
        let operator_addr = operator_listener.local_addr()?;
        let operator_app = routes::build_operator_routes(state.clone());
        let operator = tokio::spawn(async move {
            let _ = axum::serve(operator_listener, operator_app).await;
        });

        Ok(Self {
            addr,
            operator_addr,
            state,
            rooms,
            clock,
            shutdown,
            handles: vec![public, operator],
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, room_id: &str, user_id: &str, token: &str) -> String {
        format!(
            "ws://{}/ws?roomId={room_id}&userId={user_id}&token={token}",
            self.addr
        )
    }

    /// Connect with a correctly signed token.
    pub async fn connect(&self, room_id: &str, user_id: &str) -> Client {
        let token = signing::sign_session_token(
            &SecretString::from(TEST_NODE_SECRET),
            room_id,
            user_id,
            TEST_NODE_KEY,
        );
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url(room_id, user_id, &token))
            .await
            .expect("websocket handshake should succeed");
        ws
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

pub fn limits(max_rooms: usize, max_users_per_room: usize) -> RoomLimits {
    RoomLimits {
        max_rooms,
        max_users_per_room,
        idle_ttl_ms: 60_000,
    }
}

/// Next JSON frame from the server, skipping control frames.
///
/// Returns `None` once the server closes the connection.
pub async fn next_frame(ws: &mut Client) -> Option<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame");
        match msg {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(&text).expect("frame should be JSON"))
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => {}
        }
    }
}

pub async fn send_text(ws: &mut Client, text: &str) {
    ws.send(Message::Text(
        serde_json::json!({"type": "msg", "text": text}).to_string(),
    ))
    .await
    .expect("send should succeed");
}

/// Poll until `check` holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
