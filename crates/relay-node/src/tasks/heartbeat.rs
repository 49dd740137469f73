//! Heartbeat task.
//!
//! Reports room and user counts to the router, signed with the node secret.
//! The first heartbeat goes out immediately. A failed heartbeat is logged
//! and the next tick tries again; the task never exits on router errors.

use crate::credentials::NodeCredentials;
use crate::errors::NodeError;
use crate::observability::metrics;
use crate::rooms::RoomManager;
use crate::router_client::{HeartbeatReport, RouterClient};
use common::clock::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct HeartbeatSender {
    pub client: RouterClient,
    pub credentials: NodeCredentials,
    pub public_url: String,
    pub rooms: Arc<RoomManager>,
    pub clock: Arc<dyn Clock>,
}

impl HeartbeatSender {
    /// Sample room activity and post one heartbeat.
    ///
    /// # Errors
    ///
    /// Whatever `RouterClient::send_heartbeat` returns.
    pub async fn send_once(&self) -> Result<(), NodeError> {
        let stats = self.rooms.stats();
        metrics::set_activity(stats.rooms, stats.users);

        let report = HeartbeatReport {
            rooms_active: stats.rooms as u64,
            users_active: stats.users as u64,
            ts: self.clock.now_ms(),
        };

        self.client
            .send_heartbeat(
                &self.credentials.node_key,
                &self.credentials.node_secret,
                &self.public_url,
                report,
            )
            .await
    }
}

/// Run the heartbeat loop until `cancel_token` fires.
#[instrument(skip_all, name = "node.task.heartbeat")]
pub async fn start_heartbeat_task(
    sender: HeartbeatSender,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "node.heartbeat",
        node_key = %sender.credentials.node_key,
        interval_secs = interval.as_secs(),
        "Heartbeat task started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: "node.heartbeat", "Heartbeat task received shutdown signal, exiting");
                break;
            }
            _ = ticker.tick() => {
                match sender.send_once().await {
                    Ok(()) => {
                        metrics::record_heartbeat("accepted");
                        debug!(target: "node.heartbeat", "Heartbeat accepted");
                    }
                    Err(e) => {
                        metrics::record_heartbeat(e.code());
                        warn!(target: "node.heartbeat", error = %e, "Heartbeat failed, will retry");
                    }
                }
            }
        }
    }
}
