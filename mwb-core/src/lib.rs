//! Control and protocol core for the Mecanum-Wheel Bot on no-std embedded
//! platforms.
//!
//! For a runnable host simulation, see the `mwb-app/mock-mcu` binary.
#![no_std]

pub mod utils;

#[doc(hidden)]
pub mod __private {
    pub use static_cell::StaticCell;
}
