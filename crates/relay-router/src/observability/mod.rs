//! Observability for the router.

pub mod metrics;
