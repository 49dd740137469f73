//! TTL sweeper background task.
//!
//! Periodically drops expired sticky mappings, join tokens and used
//! challenge nonces, and refreshes the state gauges.
//!
//! # Graceful Shutdown
//!
//! Exits when the cancellation token fires.

use crate::observability::metrics;
use crate::registry::NodeRegistry;
use crate::services::{EnrollmentIssuer, StickyMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 30;

/// Stores the sweeper acts on.
#[derive(Debug, Clone)]
pub struct SweepTargets {
    pub registry: Arc<NodeRegistry>,
    pub sticky: Arc<StickyMap>,
    pub enrollment: Arc<EnrollmentIssuer>,
    pub node_online_ttl_ms: u64,
}

impl SweepTargets {
    /// Run one sweep pass. Returns the number of entries removed.
    pub fn sweep_once(&self) -> usize {
        let sticky_removed = self.sticky.sweep();
        let enrollment_removed = self.enrollment.sweep();

        metrics::set_sticky_rooms(self.sticky.live_count());
        metrics::set_node_counts(
            self.registry.count_online(self.node_online_ttl_ms),
            self.registry.len(),
        );

        let removed = sticky_removed + enrollment_removed;
        if removed > 0 {
            debug!(
                target: "router.sweeper",
                sticky_removed,
                enrollment_removed,
                "Swept expired entries"
            );
        }
        removed
    }
}

/// Run the sweeper until `cancel_token` fires.
#[instrument(skip_all, name = "router.task.sweeper")]
pub async fn start_sweeper(targets: SweepTargets, interval: Duration, cancel_token: CancellationToken) {
    info!(
        target: "router.sweeper",
        interval_secs = interval.as_secs(),
        "Sweeper task started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                targets.sweep_once();
            }
            () = cancel_token.cancelled() => {
                info!(target: "router.sweeper", "Sweeper task received shutdown signal, exiting");
                break;
            }
        }
    }
}
