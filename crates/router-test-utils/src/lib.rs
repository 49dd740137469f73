//! # Router Test Utilities
//!
//! Shared test utilities for the relay router.
//!
//! This crate provides:
//! - Server test harness (`TestRouterServer` for E2E tests)
//! - Heartbeat signing helper (`signed_heartbeat`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use router_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestRouterServer::spawn().await?;
//!
//!     let response = reqwest::get(format!("{}/ping", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

pub use server_harness::*;
