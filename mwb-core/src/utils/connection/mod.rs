//! Module Exports
//!
//! This file exports the modules implementing the host serial link.
//!
//! # Modules
//! - `frame`: fixed-length frame layout, sealing and validation.
//! - `link`: the send/watchdog and receive halves of the link.
//! - `protocol`: packet table and payload codecs.

pub mod frame;
pub mod link;
pub mod protocol;

pub use frame::FrameError;
pub use link::{Downlink, LinkConfig, LinkState, PayloadError, TransportError, Uplink};
