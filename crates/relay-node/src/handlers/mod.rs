//! HTTP and WebSocket handlers for the node.

pub mod health;
pub mod metrics;
pub mod stats;
pub mod ws;

pub use health::ping;
pub use metrics::metrics_handler;
pub use stats::node_stats;
pub use ws::ws_handler;
