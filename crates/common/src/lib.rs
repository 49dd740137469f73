//! Common utilities and types shared by the relay router and relay nodes.

#![warn(clippy::pedantic)]

/// Module for the shared error taxonomy
pub mod error;

/// Module for identifier generation and shared id types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for HMAC signing and verification of relay credentials
pub mod signing;

/// Module for the wall-clock abstraction used by TTL-bearing stores
pub mod clock;
