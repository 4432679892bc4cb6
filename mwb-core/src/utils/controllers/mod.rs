//! Module Exports
//!
//! This file exports the control loops of the robot.
//!
//! - `pid` and `slope`: the setpoint filter and feedback compensator.
//! - `driver`: encoder and H-bridge seams of a wheel.
//! - `motor`: closed-loop velocity actuator for one wheel.
//! - `chassis`: mecanum chassis state machine owning four actuators.

pub mod chassis;
pub mod driver;
pub mod motor;
pub mod pid;
pub mod slope;

pub use chassis::{ChassisCommand, ChassisConfig, ChassisState, MecanumChassis};
pub use motor::{MotorActuator, MotorConfig, MotorState};
