//! Fixed-period base tick fanning out to the control and link tasks.

use serde::{Deserialize, Serialize};

use super::Decimator;
use crate::utils::{
    connection::{
        link::{OfflineHandler, PayloadSource, Transport, Uplink},
        protocol::PacketType,
    },
    controllers::{
        chassis::{ChassisTelemetry, MecanumChassis},
        driver::{EncoderSource, WheelOutput},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Base ticks between wheel telemetry frames.
    pub telemetry_divisor: u32,
    /// Base ticks between body twist frames; 0 disables them.
    pub twist_divisor: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            telemetry_divisor: 20,
            twist_divisor: 0,
        }
    }
}

/// Runs one base tick in a fixed order: wheel loops, chassis, link
/// watchdog, then any telemetry that is due.
pub struct Heartbeat<'a, E, O, T, S, H> {
    chassis: MecanumChassis<'a, E, O>,
    uplink: Uplink<'a, T, S, H>,
    telemetry: Decimator,
    twist: Option<Decimator>,
    ticks: u64,
    send_failures: u32,
}

impl<'a, E, O, T, S, H> Heartbeat<'a, E, O, T, S, H>
where
    E: EncoderSource,
    O: WheelOutput,
    T: Transport,
    S: PayloadSource<Param = ChassisTelemetry>,
    H: OfflineHandler,
{
    pub fn new(
        config: HeartbeatConfig,
        chassis: MecanumChassis<'a, E, O>,
        uplink: Uplink<'a, T, S, H>,
    ) -> Self {
        Self {
            chassis,
            uplink,
            telemetry: Decimator::new(config.telemetry_divisor),
            twist: (config.twist_divisor > 0).then(|| Decimator::new(config.twist_divisor)),
            ticks: 0,
            send_failures: 0,
        }
    }

    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);

        self.chassis.tick_wheels();
        self.chassis.tick();
        self.uplink.watchdog();

        let wheels_due = self.telemetry.tick();
        let twist_due = self.twist.as_mut().is_some_and(Decimator::tick);
        if !(wheels_due || twist_due) {
            return;
        }

        let snapshot = self.chassis.telemetry();
        if wheels_due {
            self.send(PacketType::WheelTelemetry, &snapshot);
        }
        if twist_due {
            self.send(PacketType::BodyTwist, &snapshot);
        }
    }

    fn send(
        &mut self,
        packet: PacketType,
        snapshot: &ChassisTelemetry,
    ) {
        if let Err(e) = self.uplink.send(packet.into(), snapshot) {
            self.send_failures = self.send_failures.saturating_add(1);
            tracing::warn!(?packet, error = ?e, "telemetry send failed");
        }
    }

    /// Base ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn send_failures(&self) -> u32 {
        self.send_failures
    }

    pub fn chassis(&self) -> &MecanumChassis<'a, E, O> {
        &self.chassis
    }

    pub fn chassis_mut(&mut self) -> &mut MecanumChassis<'a, E, O> {
        &mut self.chassis
    }

    pub fn uplink(&self) -> &Uplink<'a, T, S, H> {
        &self.uplink
    }

    pub fn uplink_mut(&mut self) -> &mut Uplink<'a, T, S, H> {
        &mut self.uplink
    }
}
