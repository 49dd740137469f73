//! Registry persistence background task.
//!
//! Waits for a registry mutation, lets further mutations coalesce for a
//! short debounce, then rewrites the snapshot. A failed write is logged and
//! retried later; it never reaches a request. A final flush runs on
//! shutdown.

use crate::observability::metrics;
use crate::registry::NodeRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Coalescing delay between a mutation and the write.
pub const DEFAULT_FLUSH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Delay before retrying a failed write.
pub const FLUSH_RETRY_DELAY: Duration = Duration::from_secs(5);

async fn flush(registry: &NodeRegistry, path: &std::path::Path) -> bool {
    let start = Instant::now();
    match registry.flush_to(path).await {
        Ok(wrote) => {
            if wrote {
                metrics::record_registry_flush("success", start.elapsed());
            }
            true
        }
        Err(e) => {
            metrics::record_registry_flush("error", start.elapsed());
            error!(target: "router.registry", error = %e, "Registry flush failed");
            false
        }
    }
}

/// Run the flush loop until `cancel_token` fires.
#[instrument(skip_all, name = "router.task.registry_flush")]
pub async fn start_registry_flush(
    registry: Arc<NodeRegistry>,
    path: PathBuf,
    debounce: Duration,
    cancel_token: CancellationToken,
) {
    info!(target: "router.registry", path = %path.display(), "Registry flush task started");

    loop {
        if !registry.is_dirty() {
            tokio::select! {
                () = registry.changed() => {}
                () = cancel_token.cancelled() => break,
            }
        }

        tokio::select! {
            () = tokio::time::sleep(debounce) => {}
            () = cancel_token.cancelled() => break,
        }

        if !flush(&registry, &path).await {
            tokio::select! {
                () = tokio::time::sleep(FLUSH_RETRY_DELAY) => {}
                () = cancel_token.cancelled() => break,
            }
        }
    }

    flush(&registry, &path).await;
    info!(target: "router.registry", "Registry flush task stopped");
}
