//! Background tasks for the node.
//!
//! # Tasks
//!
//! - `heartbeat` - Signed liveness reports to the router
//! - `room_sweeper` - Idle room reclamation

pub mod heartbeat;
pub mod room_sweeper;

pub use heartbeat::{start_heartbeat_task, HeartbeatSender};
pub use room_sweeper::start_room_sweeper;
