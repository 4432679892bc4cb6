//! Packet table and payload codecs of the host link.
//!
//! Payloads are `postcard`-encoded serde structs: `f32` fields go out as
//! 4 little-endian bytes and the chassis state as a single byte.

use serde::{Deserialize, Serialize};

use super::link::{OfflineHandler, PayloadError, PayloadSink, PayloadSource};
use crate::utils::controllers::chassis::{ChassisCommand, ChassisState, ChassisTelemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Uplink: measured wheel rates.
    WheelTelemetry = 0x00,
    /// Uplink: body twist estimated from the wheel rates.
    BodyTwist = 0x01,
    /// Downlink: chassis state and twist command.
    ChassisCommand = 0xF0,
}

impl TryFrom<u8> for PacketType {
    type Error = PayloadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::WheelTelemetry),
            0x01 => Ok(Self::BodyTwist),
            0xF0 => Ok(Self::ChassisCommand),
            other => Err(PayloadError::UnknownPacket(other)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChassisCommandPayload {
    pub state: ChassisState,
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelTelemetryPayload {
    pub wheel_omega: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyTwistPayload {
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

pub const COMMAND_PAYLOAD_LEN: usize = 13;
pub const WHEEL_TELEMETRY_PAYLOAD_LEN: usize = 16;
pub const BODY_TWIST_PAYLOAD_LEN: usize = 12;

/// Encode `value` at the start of `payload`, returning the bytes written.
pub fn encode<T: Serialize>(
    value: &T,
    payload: &mut [u8],
) -> Result<usize, PayloadError> {
    postcard::to_slice(value, payload)
        .map(|used| used.len())
        .map_err(|_| PayloadError::Malformed)
}

/// Decode a `T` from the start of `payload`; trailing bytes are ignored.
pub fn decode<'de, T: Deserialize<'de>>(payload: &'de [u8]) -> Result<T, PayloadError> {
    postcard::from_bytes(payload).map_err(|_| PayloadError::Malformed)
}

/// Routes downlink commands into the shared [`ChassisCommand`].
pub struct ChassisCommandSink<'a> {
    command: &'a ChassisCommand,
}

impl<'a> ChassisCommandSink<'a> {
    pub fn new(command: &'a ChassisCommand) -> Self {
        Self { command }
    }
}

impl PayloadSink for ChassisCommandSink<'_> {
    fn handle(
        &mut self,
        packet_type: u8,
        payload: &[u8],
    ) -> Result<(), PayloadError> {
        match PacketType::try_from(packet_type)? {
            PacketType::ChassisCommand => {
                let cmd: ChassisCommandPayload = decode(payload)?;
                tracing::trace!(?cmd, "chassis command");
                if !(cmd.vx.is_finite() && cmd.vy.is_finite() && cmd.omega.is_finite()) {
                    return Err(PayloadError::Malformed);
                }

                // rejected transitions are logged by the command and otherwise dropped
                match cmd.state {
                    ChassisState::Running => {
                        let _ = self.command.set_motion(cmd.vx, cmd.vy, cmd.omega);
                    }
                    ChassisState::Suspended | ChassisState::Braked => {
                        let _ = self.command.set_stop(cmd.state);
                    }
                    ChassisState::Disabled => {}
                }
                Ok(())
            }
            PacketType::WheelTelemetry | PacketType::BodyTwist => Err(PayloadError::UnknownPacket(packet_type)),
        }
    }
}

/// Fills uplink payloads from a [`ChassisTelemetry`] snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetrySource;

impl PayloadSource for TelemetrySource {
    type Param = ChassisTelemetry;

    fn fill(
        &mut self,
        packet_type: u8,
        telemetry: &ChassisTelemetry,
        payload: &mut [u8],
    ) -> Result<(), PayloadError> {
        match PacketType::try_from(packet_type)? {
            PacketType::WheelTelemetry => encode(
                &WheelTelemetryPayload {
                    wheel_omega: telemetry.measured,
                },
                payload,
            )
            .map(drop),
            PacketType::BodyTwist => {
                let (vx, vy, omega) = telemetry.twist;
                encode(&BodyTwistPayload { vx, vy, omega }, payload).map(drop)
            }
            PacketType::ChassisCommand => Err(PayloadError::UnknownPacket(packet_type)),
        }
    }
}

/// Drops the chassis to `Suspended` when the host goes quiet.
pub struct SuspendOnOffline<'a> {
    command: &'a ChassisCommand,
}

impl<'a> SuspendOnOffline<'a> {
    pub fn new(command: &'a ChassisCommand) -> Self {
        Self { command }
    }
}

impl OfflineHandler for SuspendOnOffline<'_> {
    fn on_offline(&mut self) {
        if self.command.state() != ChassisState::Disabled {
            let _ = self.command.set_stop(ChassisState::Suspended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_sizes_match_frame_lengths() {
        let mut buf = [0u8; 32];
        let cmd = ChassisCommandPayload {
            state: ChassisState::Running,
            vx: 0.1,
            vy: -0.2,
            omega: 0.3,
        };
        assert_eq!(encode(&cmd, &mut buf), Ok(COMMAND_PAYLOAD_LEN));
        assert_eq!(buf[0], ChassisState::Running as u8);
        assert_eq!(&buf[1..5], &0.1f32.to_le_bytes());

        let wheels = WheelTelemetryPayload { wheel_omega: [1.0; 4] };
        assert_eq!(encode(&wheels, &mut buf), Ok(WHEEL_TELEMETRY_PAYLOAD_LEN));

        let twist = BodyTwistPayload {
            vx: 0.0,
            vy: 0.0,
            omega: 0.0,
        };
        assert_eq!(encode(&twist, &mut buf), Ok(BODY_TWIST_PAYLOAD_LEN));
    }

    #[test]
    fn encode_fails_on_short_buffer() {
        let mut buf = [0u8; 8];
        let wheels = WheelTelemetryPayload { wheel_omega: [1.0; 4] };
        assert_eq!(encode(&wheels, &mut buf), Err(PayloadError::Malformed));
    }

    #[test]
    fn packet_type_table() {
        assert_eq!(PacketType::try_from(0xF0), Ok(PacketType::ChassisCommand));
        assert_eq!(u8::from(PacketType::BodyTwist), 0x01);
        assert_eq!(PacketType::try_from(0x7F), Err(PayloadError::UnknownPacket(0x7F)));
    }

    #[test]
    fn sink_dispatches_by_state() {
        let command = ChassisCommand::new();
        command.enable().unwrap();
        let mut sink = ChassisCommandSink::new(&command);
        let mut buf = [0u8; COMMAND_PAYLOAD_LEN];

        let run = ChassisCommandPayload {
            state: ChassisState::Running,
            vx: 0.4,
            vy: 0.0,
            omega: -1.0,
        };
        encode(&run, &mut buf).unwrap();
        sink.handle(PacketType::ChassisCommand.into(), &buf).unwrap();
        let snap = command.snapshot();
        assert_eq!((snap.state, snap.vx, snap.omega), (ChassisState::Running, 0.4, -1.0));

        // Disabled is not a command the host may issue
        let disable = ChassisCommandPayload {
            state: ChassisState::Disabled,
            ..run
        };
        encode(&disable, &mut buf).unwrap();
        sink.handle(0xF0, &buf).unwrap();
        assert_eq!(command.state(), ChassisState::Running);

        let brake = ChassisCommandPayload {
            state: ChassisState::Braked,
            ..run
        };
        encode(&brake, &mut buf).unwrap();
        sink.handle(0xF0, &buf).unwrap();
        assert_eq!(command.state(), ChassisState::Braked);
    }

    #[test]
    fn sink_rejects_unknown_state_byte() {
        let command = ChassisCommand::new();
        command.enable().unwrap();
        let mut sink = ChassisCommandSink::new(&command);
        let mut buf = [0u8; COMMAND_PAYLOAD_LEN];
        buf[0] = 9;
        assert_eq!(sink.handle(0xF0, &buf), Err(PayloadError::Malformed));
        assert_eq!(sink.handle(0x00, &buf), Err(PayloadError::UnknownPacket(0x00)));
        assert_eq!(command.state(), ChassisState::Suspended);
    }

    #[test]
    fn sink_rejects_non_finite_twist() {
        let command = ChassisCommand::new();
        command.enable().unwrap();
        let mut sink = ChassisCommandSink::new(&command);
        let mut buf = [0u8; COMMAND_PAYLOAD_LEN];

        for (vx, vy, omega) in [(f32::NAN, 0.0, 0.0), (0.0, f32::INFINITY, 0.0), (0.0, 0.0, f32::NEG_INFINITY)] {
            let cmd = ChassisCommandPayload {
                state: ChassisState::Running,
                vx,
                vy,
                omega,
            };
            encode(&cmd, &mut buf).unwrap();
            assert_eq!(sink.handle(0xF0, &buf), Err(PayloadError::Malformed));
        }
        assert_eq!(command.state(), ChassisState::Suspended);
    }

    #[test]
    fn telemetry_source_writes_measured_rates() {
        let telemetry = ChassisTelemetry {
            measured: [1.0, -2.0, 3.0, -4.0],
            twist: (0.5, 0.25, 0.125),
            ..ChassisTelemetry::default()
        };
        let mut source = TelemetrySource;
        let mut payload = [0u8; WHEEL_TELEMETRY_PAYLOAD_LEN];

        source.fill(0x00, &telemetry, &mut payload).unwrap();
        let wheels: WheelTelemetryPayload = decode(&payload).unwrap();
        assert_eq!(wheels.wheel_omega, telemetry.measured);

        source.fill(0x01, &telemetry, &mut payload).unwrap();
        let twist: BodyTwistPayload = decode(&payload).unwrap();
        assert_eq!((twist.vx, twist.vy, twist.omega), telemetry.twist);

        assert!(source.fill(0xF0, &telemetry, &mut payload).is_err());
    }

    #[test]
    fn offline_suspends_enabled_chassis_only() {
        let command = ChassisCommand::new();
        let mut handler = SuspendOnOffline::new(&command);
        handler.on_offline();
        assert_eq!(command.state(), ChassisState::Disabled);

        command.enable().unwrap();
        command.set_motion(1.0, 0.0, 0.0).unwrap();
        handler.on_offline();
        assert_eq!(command.state(), ChassisState::Suspended);
    }
}
