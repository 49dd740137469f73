//! WebSocket relay integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use futures::SinkExt;
use serde_json::json;
use support::{eventually, limits, next_frame, send_text, TestNode};
use tokio_tungstenite::tungstenite::{self, Message};

#[tokio::test]
async fn test_forged_token_is_rejected_before_upgrade() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;

    let err = tokio_tungstenite::connect_async(node.ws_url("R-1", "U-1", "deadbeef"))
        .await
        .expect_err("handshake should be refused");

    assert!(
        matches!(&err, tungstenite::Error::Http(response) if response.status() == 401),
        "expected HTTP 401, got {err:?}"
    );
    assert_eq!(node.rooms.stats().rooms, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_handshake_fields_rejected() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;

    let response = reqwest::get(format!("{}/ws?roomId=R-1", node.url())).await?;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body, json!({"ok": false, "error": "unauthorized"}));
    Ok(())
}

#[tokio::test]
async fn test_join_broadcasts_membership_and_relays_messages() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;

    let mut alice = node.connect("R-chat", "U-alice").await;
    assert_eq!(
        next_frame(&mut alice).await,
        Some(json!({"type": "system", "text": "U-alice joined"}))
    );
    assert_eq!(
        next_frame(&mut alice).await,
        Some(json!({"type": "room_info", "userCount": 1}))
    );

    let mut bob = node.connect("R-chat", "U-bob").await;
    for ws in [&mut alice, &mut bob] {
        assert_eq!(
            next_frame(ws).await,
            Some(json!({"type": "system", "text": "U-bob joined"}))
        );
        assert_eq!(
            next_frame(ws).await,
            Some(json!({"type": "room_info", "userCount": 2}))
        );
    }

    send_text(&mut bob, "hello").await;
    for ws in [&mut alice, &mut bob] {
        assert_eq!(
            next_frame(ws).await,
            Some(json!({"type": "msg", "userId": "U-bob", "text": "hello"}))
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_client_frames_are_ignored() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;
    let mut ws = node.connect("R-1", "U-1").await;
    next_frame(&mut ws).await;
    next_frame(&mut ws).await;

    ws.send(Message::Text(r#"{"type":"typing"}"#.to_string()))
        .await?;
    ws.send(Message::Text("not json".to_string())).await?;
    send_text(&mut ws, "after noise").await;

    assert_eq!(
        next_frame(&mut ws).await,
        Some(json!({"type": "msg", "userId": "U-1", "text": "after noise"}))
    );
    Ok(())
}

#[tokio::test]
async fn test_full_room_sends_error_then_closes() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 2)).await?;
    let _a = node.connect("R-1", "U-1").await;
    let _b = node.connect("R-1", "U-2").await;
    assert!(eventually(|| node.rooms.member_count("R-1") == Some(2)).await);

    let mut late = node.connect("R-1", "U-3").await;
    assert_eq!(
        next_frame(&mut late).await,
        Some(json!({"type": "error_msg", "error": "room_full"}))
    );
    assert_eq!(next_frame(&mut late).await, None);
    assert_eq!(node.rooms.member_count("R-1"), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_room_ceiling_sends_rooms_full() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(1, 10)).await?;
    let _a = node.connect("R-1", "U-1").await;
    assert!(eventually(|| node.rooms.stats().rooms == 1).await);

    let mut other = node.connect("R-2", "U-2").await;
    assert_eq!(
        next_frame(&mut other).await,
        Some(json!({"type": "error_msg", "error": "rooms_full"}))
    );
    Ok(())
}

#[tokio::test]
async fn test_disconnect_broadcasts_departure_and_closes_empty_room() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;

    let mut alice = node.connect("R-1", "U-alice").await;
    next_frame(&mut alice).await;
    next_frame(&mut alice).await;

    let mut bob = node.connect("R-1", "U-bob").await;
    next_frame(&mut alice).await;
    next_frame(&mut alice).await;

    bob.close(None).await?;
    assert_eq!(
        next_frame(&mut alice).await,
        Some(json!({"type": "system", "text": "U-bob left"}))
    );
    assert_eq!(
        next_frame(&mut alice).await,
        Some(json!({"type": "room_info", "userCount": 1}))
    );

    alice.close(None).await?;
    assert!(eventually(|| node.rooms.member_count("R-1").is_none()).await);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_survives_old_socket_closing() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;

    let mut old = node.connect("R-1", "U-1").await;
    next_frame(&mut old).await;
    next_frame(&mut old).await;

    let mut new = node.connect("R-1", "U-1").await;
    assert_eq!(
        next_frame(&mut new).await,
        Some(json!({"type": "system", "text": "U-1 joined"}))
    );
    assert_eq!(
        next_frame(&mut new).await,
        Some(json!({"type": "room_info", "userCount": 1}))
    );
    assert!(eventually(|| node.rooms.connection_count("R-1") == Some(2)).await);

    old.close(None).await?;
    assert!(eventually(|| node.rooms.connection_count("R-1") == Some(1)).await);
    assert_eq!(node.rooms.member_count("R-1"), Some(1));

    send_text(&mut new, "still here").await;
    assert_eq!(
        next_frame(&mut new).await,
        Some(json!({"type": "msg", "userId": "U-1", "text": "still here"}))
    );

    new.close(None).await?;
    assert!(eventually(|| node.rooms.member_count("R-1").is_none()).await);
    Ok(())
}

#[tokio::test]
async fn test_idle_sweep_expires_open_sessions() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;
    let mut ws = node.connect("R-quiet", "U-1").await;
    next_frame(&mut ws).await;
    next_frame(&mut ws).await;

    node.clock.advance(60_001);
    assert_eq!(node.rooms.sweep(), 1);

    assert_eq!(
        next_frame(&mut ws).await,
        Some(json!({"type": "error_msg", "error": "room_expired"}))
    );
    assert_eq!(next_frame(&mut ws).await, None);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_sessions() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;
    let mut ws = node.connect("R-1", "U-1").await;
    next_frame(&mut ws).await;
    next_frame(&mut ws).await;

    node.shutdown.cancel();

    assert_eq!(next_frame(&mut ws).await, None);
    assert!(eventually(|| node.rooms.stats().rooms == 0).await);
    Ok(())
}

#[tokio::test]
async fn test_stats_on_public_and_operator_listeners() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;
    let _a = node.connect("R-1", "U-1").await;
    let _b = node.connect("R-1", "U-2").await;
    let _c = node.connect("R-2", "U-3").await;
    assert!(eventually(|| node.rooms.stats().users == 3).await);

    node.clock.advance(90_000);

    for url in [
        format!("{}/public/stats", node.url()),
        format!("http://{}/stats", node.operator_addr),
    ] {
        let json: serde_json::Value = reqwest::get(&url).await?.json().await?;
        assert_eq!(json["ok"], true);
        assert_eq!(json["at"], support::TEST_START_MS + 90_000);
        assert_eq!(json["node"]["key"], support::TEST_NODE_KEY);
        assert_eq!(json["node"]["publicUrl"], node.url());
        assert_eq!(json["runtime"]["uptimeSec"], 90);
        assert_eq!(json["activity"], json!({"rooms": 2, "users": 3}));
    }
    Ok(())
}

#[tokio::test]
async fn test_ping_and_metrics() -> anyhow::Result<()> {
    let node = TestNode::spawn(limits(10, 10)).await?;

    let pong = reqwest::get(format!("{}/ping", node.url())).await?.text().await?;
    assert_eq!(pong, "pong");

    let metrics = reqwest::get(format!("{}/metrics", node.url())).await?;
    assert_eq!(metrics.status(), 200);
    Ok(())
}
