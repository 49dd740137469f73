//! Service layer for the router.
//!
//! # Components
//!
//! - `allocator` - Sticky, latency-aware room allocation
//! - `enrollment` - Challenge and one-shot token enrollment of new nodes
//! - `heartbeat` - Signed heartbeat verification
//! - `router_secret` - Loading/generating the enrollment secret
//! - `sticky` - TTL-bounded room to node mapping

pub mod allocator;
pub mod enrollment;
pub mod heartbeat;
pub mod router_secret;
pub mod sticky;

pub use allocator::{Allocation, Allocator};
pub use enrollment::{EnrolledNode, EnrollmentIssuer, EnrollmentPolicy, MintedToken};
pub use heartbeat::{Heartbeat, HeartbeatRejection, HeartbeatVerifier};
pub use sticky::StickyMap;
