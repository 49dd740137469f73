//! Observability for the node.

pub mod metrics;
