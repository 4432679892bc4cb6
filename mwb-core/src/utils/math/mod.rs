//! Math utilities for the Mecanum-Wheel Bot.
//!
//! This module provides kinematics calculations for four-wheeled mecanum
//! robots and the CRC-8 used by the serial link.

pub mod crc;
pub mod kinematics;
