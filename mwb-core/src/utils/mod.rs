//! Utility re-exports and helper macros for the Mecanum-Wheel Bot.
//!
//! This module re-exports the control loops, the host link, the base-tick
//! scheduler and the math helpers:
//!
//! - `connection`: framed, CRC-checked serial link to the host computer
//! - `controllers`: PID, slope limiter, wheel actuators and the chassis
//! - `math`: mecanum kinematics and CRC-8
//! - `scheduler`: decimated base tick driving everything above
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod connection;
pub mod controllers;
pub mod math;
pub mod scheduler;

pub use controllers::{ChassisCommand, MecanumChassis};
pub use math::kinematics::MecanumKinematics;
pub use scheduler::Heartbeat;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::__private::StaticCell<$t> = $crate::__private::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
