//! HTTP middleware for the router.

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
