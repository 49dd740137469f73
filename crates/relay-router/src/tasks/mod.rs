//! Background tasks for the router.
//!
//! # Tasks
//!
//! - `sweeper` - Expires sticky mappings and enrollment credentials
//! - `registry_flush` - Debounced registry snapshot writes

pub mod registry_flush;
pub mod sweeper;

pub use registry_flush::{start_registry_flush, DEFAULT_FLUSH_DEBOUNCE};
pub use sweeper::{start_sweeper, SweepTargets, DEFAULT_SWEEP_INTERVAL_SECONDS};
