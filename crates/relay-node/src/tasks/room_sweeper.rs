//! Idle room reclamation.
//!
//! Rooms normally close when their last member leaves. The sweep catches
//! rooms whose connections vanished without a clean leave.

use crate::observability::metrics;
use crate::rooms::RoomManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Run the room sweep until `cancel_token` fires.
#[instrument(skip_all, name = "node.task.room_sweeper")]
pub async fn start_room_sweeper(
    rooms: Arc<RoomManager>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "node.rooms",
        interval_secs = interval.as_secs(),
        "Room sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reclaimed = rooms.sweep();
                if reclaimed > 0 {
                    info!(target: "node.rooms", reclaimed, "Reclaimed idle rooms");
                    metrics::record_rooms_reclaimed(reclaimed);
                }
                let stats = rooms.stats();
                metrics::set_activity(stats.rooms, stats.users);
            }
            () = cancel_token.cancelled() => {
                info!(target: "node.rooms", "Room sweeper received shutdown signal, exiting");
                break;
            }
        }
    }
}
