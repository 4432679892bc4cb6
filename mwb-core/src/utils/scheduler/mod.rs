//! Base-tick scheduling.
//!
//! - `decimator`: divides the base tick down to a task's own period
//! - `heartbeat`: the fixed-order base tick driving control and link tasks

pub mod decimator;
pub mod heartbeat;

pub use decimator::Decimator;
pub use heartbeat::{Heartbeat, HeartbeatConfig};
