//! HTTP request handlers for the router.

pub mod allocate;
pub mod enrollment;
pub mod health;
pub mod metrics;
pub mod nodes;
pub mod public;

pub use allocate::allocate;
pub use enrollment::{join, join_challenge, mint_join_token};
pub use health::ping;
pub use metrics::metrics_handler;
pub use nodes::{list_nodes, register};
pub use public::{public_routers, public_stats};
