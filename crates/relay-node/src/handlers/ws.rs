//! Client WebSocket.
//!
//! `GET /ws?roomId=..&userId=..&token=..`
//!
//! The token is checked before upgrading, so a forged handshake never gets a
//! socket. Room admission happens after the upgrade because a full room is
//! reported in-band as an `error_msg` frame.

use crate::frames::{ClientFrame, ServerFrame};
use crate::gate::{AuthorizedSession, Handshake};
use crate::observability::metrics;
use crate::rooms::{Admission, Departure};
use crate::routes::AppState;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

/// Largest client frame accepted.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Handler for GET /ws
#[instrument(skip_all, name = "node.ws.handshake")]
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(handshake): Query<Handshake>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session = match state.gate.verify(&handshake) {
        Ok(session) => session,
        Err(e) => {
            metrics::record_connection("unauthorized");
            return e.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| run_session(socket, state, session))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    ClientGone,
    RoomExpired,
    Shutdown,
}

#[instrument(
    skip_all,
    name = "node.ws.session",
    fields(room_id = %session.room_id, user_id = %session.user_id)
)]
async fn run_session(mut socket: WebSocket, state: Arc<AppState>, session: AuthorizedSession) {
    let Admission {
        user_count,
        mut events,
    } = match state.gate.admit(&session) {
        Ok(admission) => admission,
        Err(e) => {
            metrics::record_connection(e.code());
            debug!(target: "node.ws", error = %e, "Admission refused");
            let _ = socket
                .send(Message::Text(ServerFrame::error(e.code()).to_json().into()))
                .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    metrics::record_connection("admitted");
    let started = Instant::now();
    let AuthorizedSession { room_id, user_id } = session;
    info!(target: "node.ws", user_count, "Session admitted");

    state.rooms.publish(&room_id, ServerFrame::joined(&user_id));
    state
        .rooms
        .publish(&room_id, ServerFrame::RoomInfo { user_count });

    let end = loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(raw))) => {
                    if let Some(ClientFrame::Msg { text }) = ClientFrame::parse(&raw) {
                        state.rooms.touch(&room_id);
                        state.rooms.publish(
                            &room_id,
                            ServerFrame::Msg {
                                user_id: user_id.clone(),
                                text,
                            },
                        );
                        metrics::record_message_relayed();
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break SessionEnd::ClientGone,
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Ok(frame) => {
                    if socket
                        .send(Message::Text(frame.to_json().into()))
                        .await
                        .is_err()
                    {
                        break SessionEnd::ClientGone;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "node.ws", skipped, "Session fell behind room events");
                }
                Err(RecvError::Closed) => break SessionEnd::RoomExpired,
            },
            () = state.shutdown.cancelled() => break SessionEnd::Shutdown,
        }
    };

    match end {
        SessionEnd::RoomExpired => {
            let _ = socket
                .send(Message::Text(ServerFrame::error("room_expired").to_json().into()))
                .await;
            let _ = socket.send(Message::Close(None)).await;
        }
        SessionEnd::Shutdown => {
            let _ = socket.send(Message::Close(None)).await;
        }
        SessionEnd::ClientGone => {}
    }

    // An expired room is already gone; a room recreated under the same id
    // must not lose this user.
    if end != SessionEnd::RoomExpired {
        if let Some(Departure::Left { remaining }) = state.rooms.leave(&room_id, &user_id) {
            state.rooms.publish(&room_id, ServerFrame::left(&user_id));
            state.rooms.publish(
                &room_id,
                ServerFrame::RoomInfo {
                    user_count: remaining,
                },
            );
        }
    }

    metrics::record_session_closed(started.elapsed());
    info!(target: "node.ws", reason = ?end, "Session closed");
}
