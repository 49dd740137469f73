//! Relay node library.
//!
//! A node hosts chat rooms for the relay mesh:
//!
//! - Enrolls with the router once and keeps the resulting credentials
//! - Verifies router-minted session tokens on WebSocket handshakes
//! - Admits clients into rooms under room and member ceilings
//! - Relays messages to room members and reclaims idle rooms
//! - Reports activity to the router in signed heartbeats
//!
//! # Modules
//!
//! - `config` - Configuration from environment
//! - `credentials` - Node identity resolution and enrollment
//! - `errors` - Error types
//! - `frames` - WebSocket frame shapes
//! - `gate` - Session token verification
//! - `handlers` - HTTP and WebSocket handlers
//! - `observability` - Prometheus metrics
//! - `rooms` - Room membership and capacity
//! - `router_client` - HTTP client for the router
//! - `routes` - Axum router setup
//! - `system_info` - Process runtime figures
//! - `tasks` - Heartbeat and room sweep tasks

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod config;
pub mod credentials;
pub mod errors;
pub mod frames;
pub mod gate;
pub mod handlers;
pub mod observability;
pub mod rooms;
pub mod router_client;
pub mod routes;
pub mod system_info;
pub mod tasks;
