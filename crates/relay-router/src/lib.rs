//! Relay router library.
//!
//! The router is the directory and placement authority of a relay mesh:
//!
//! - Tracks enrolled nodes and their liveness (signed heartbeats)
//! - Places rooms on nodes (sticky mapping, then lowest client latency)
//! - Mints per-session tokens that the chosen node can verify on its own
//! - Enrolls new nodes via signed challenges or one-shot tokens
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> registry/
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Wire models
//! - `observability` - Prometheus metrics
//! - `registry` - Node directory and snapshot persistence
//! - `routes` - Axum router setup
//! - `services` - Allocation, heartbeat and enrollment logic
//! - `tasks` - Background sweeper and flush tasks

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod registry;
pub mod routes;
pub mod services;
pub mod tasks;
