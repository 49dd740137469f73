//! Router and node together: enroll, heartbeat, allocate, connect.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use common::clock::Clock;
use relay_node::config::Config;
use relay_node::credentials::{self, CredentialSource};
use relay_node::router_client::RouterClient;
use relay_node::tasks::HeartbeatSender;
use router_test_utils::TestRouterServer;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use support::{limits, next_frame, send_text, TestNode};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite;

struct Mesh {
    router: TestRouterServer,
    node: TestNode,
    heartbeat: HeartbeatSender,
    _data_dir: tempfile::TempDir,
}

/// Enroll a fresh node with a fresh router via the challenge flow.
async fn mesh() -> anyhow::Result<Mesh> {
    let router = TestRouterServer::spawn().await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let public_url = format!("http://{}", listener.local_addr()?);
    let data_dir = tempfile::tempdir()?;

    let config = Config::from_vars(&HashMap::from([
        ("NODE_PUBLIC_URL".to_string(), public_url.clone()),
        ("ROUTER_URL".to_string(), router.url()),
        (
            "NODE_DATA_DIR".to_string(),
            data_dir.path().display().to_string(),
        ),
    ]))?;
    let client = RouterClient::new(&config.router_url)?;
    let (creds, source) = credentials::resolve(&config, &client).await?;
    assert_eq!(source, CredentialSource::Enrolled);

    let node = TestNode::spawn_on(listener, creds.clone(), limits(10, 10), router.clock().clone())
        .await?;

    let heartbeat = HeartbeatSender {
        client,
        credentials: creds,
        public_url,
        rooms: node.rooms.clone(),
        clock: router.clock().clone() as Arc<dyn Clock>,
    };

    Ok(Mesh {
        router,
        node,
        heartbeat,
        _data_dir: data_dir,
    })
}

async fn allocate(router: &TestRouterServer, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    Ok(reqwest::Client::new()
        .post(format!("{}/allocate", router.url()))
        .json(&body)
        .send()
        .await?
        .json()
        .await?)
}

fn ws_url(node: &TestNode, allocation: &serde_json::Value) -> String {
    node.ws_url(
        allocation["roomId"].as_str().unwrap(),
        allocation["userId"].as_str().unwrap(),
        allocation["token"].as_str().unwrap(),
    )
}

#[tokio::test]
async fn test_enrolled_node_is_listed_and_heartbeats() -> anyhow::Result<()> {
    let mesh = mesh().await?;
    let key = mesh.node.state.node_key.clone();
    assert!(key.starts_with("DCN-"));

    let record = mesh.router.registry().get(&key).expect("node registered");
    assert_eq!(record.public_url, mesh.node.url());

    mesh.node.rooms.join("R-local", "U-1")?;
    mesh.heartbeat.send_once().await?;

    let nodes: serde_json::Value = reqwest::get(format!("{}/nodes", mesh.router.url()))
        .await?
        .json()
        .await?;
    assert_eq!(nodes["nodes"][0]["key"], key.as_str());
    assert_eq!(nodes["nodes"][0]["online"], true);
    assert_eq!(nodes["nodes"][0]["roomsActive"], 1);
    assert_eq!(nodes["nodes"][0]["usersActive"], 1);
    Ok(())
}

#[tokio::test]
async fn test_allocated_token_admits_client_on_node() -> anyhow::Result<()> {
    let mesh = mesh().await?;

    let allocation = allocate(&mesh.router, json!({})).await?;
    assert_eq!(allocation["ok"], true);
    assert_eq!(allocation["node"]["key"], mesh.node.state.node_key.as_str());
    assert_eq!(allocation["node"]["baseUrl"], mesh.node.url());

    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url(&mesh.node, &allocation)).await?;
    let user_id = allocation["userId"].as_str().unwrap();
    assert_eq!(
        next_frame(&mut ws).await,
        Some(json!({"type": "system", "text": format!("{user_id} joined")}))
    );
    assert_eq!(
        next_frame(&mut ws).await,
        Some(json!({"type": "room_info", "userCount": 1}))
    );

    send_text(&mut ws, "over the mesh").await;
    assert_eq!(
        next_frame(&mut ws).await,
        Some(json!({"type": "msg", "userId": user_id, "text": "over the mesh"}))
    );
    Ok(())
}

#[tokio::test]
async fn test_second_allocation_for_room_lands_on_same_node() -> anyhow::Result<()> {
    let mesh = mesh().await?;

    let first = allocate(&mesh.router, json!({})).await?;
    let room_id = first["roomId"].as_str().unwrap();
    let second = allocate(&mesh.router, json!({ "roomId": room_id })).await?;

    assert_eq!(second["roomId"], room_id);
    assert_eq!(second["node"]["key"], first["node"]["key"]);
    assert_ne!(second["userId"], first["userId"]);

    let (mut a, _) = tokio_tungstenite::connect_async(ws_url(&mesh.node, &first)).await?;
    next_frame(&mut a).await;
    next_frame(&mut a).await;
    let (_b, _) = tokio_tungstenite::connect_async(ws_url(&mesh.node, &second)).await?;

    next_frame(&mut a).await;
    assert_eq!(
        next_frame(&mut a).await,
        Some(json!({"type": "room_info", "userCount": 2}))
    );
    Ok(())
}

#[tokio::test]
async fn test_token_for_other_room_is_refused() -> anyhow::Result<()> {
    let mesh = mesh().await?;
    let allocation = allocate(&mesh.router, json!({})).await?;

    let url = mesh.node.ws_url(
        "R-somewhere-else",
        allocation["userId"].as_str().unwrap(),
        allocation["token"].as_str().unwrap(),
    );
    let err = tokio_tungstenite::connect_async(url)
        .await
        .expect_err("handshake should be refused");
    assert!(matches!(&err, tungstenite::Error::Http(r) if r.status() == 401));
    Ok(())
}
