//! Simulated wheel plant and host computer.

use core::{cell::Cell, convert::Infallible, f32::consts::PI};

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use mwb_core::utils::{
    connection::{
        frame::{self, MAX_FRAME_LEN, PAYLOAD_OFFSET},
        link::Transport,
        protocol::{self, BodyTwistPayload, ChassisCommandPayload, PacketType, WheelTelemetryPayload},
    },
    controllers::{
        ChassisState, MotorConfig,
        driver::{AtomicEncoder, Direction, IdleMode, WheelOutput},
    },
};
use tracing::{debug, info, warn};

/// Full-scale PWM compare value of the simulated timer.
pub const PWM_PERIOD: u16 = 1000;

/// Time constant of the powered motor response (s).
const DRIVE_TAU: f32 = 0.08;
/// Time constant of a coasting wheel (s).
const COAST_TAU: f32 = 0.6;
/// Time constant of a short-braked wheel (s).
const BRAKE_TAU: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Drive {
    Powered { direction: Direction, magnitude: u16 },
    Idle(IdleMode),
}

/// One H-bridge plus encoder, as seen from both sides.
pub struct PlantWheel {
    drive: Mutex<CriticalSectionRawMutex, Cell<Drive>>,
    pub encoder: AtomicEncoder,
}

impl PlantWheel {
    pub const fn new() -> Self {
        Self {
            drive: Mutex::new(Cell::new(Drive::Idle(IdleMode::Float))),
            encoder: AtomicEncoder::new(),
        }
    }

    fn update(
        &self,
        f: impl FnOnce(Drive) -> Drive,
    ) {
        self.drive.lock(|c| c.set(f(c.get())));
    }
}

/// Firmware-side handle on a [`PlantWheel`] output stage.
pub struct SimDrive(pub &'static PlantWheel);

impl WheelOutput for SimDrive {
    type Error = Infallible;

    fn max_magnitude(&self) -> u16 {
        PWM_PERIOD
    }

    fn set_direction(
        &mut self,
        direction: Direction,
    ) -> Result<(), Infallible> {
        self.0.update(|d| match d {
            Drive::Powered { magnitude, .. } => Drive::Powered { direction, magnitude },
            Drive::Idle(_) => Drive::Powered { direction, magnitude: 0 },
        });
        Ok(())
    }

    fn set_magnitude(
        &mut self,
        magnitude: u16,
    ) -> Result<(), Infallible> {
        self.0.update(|d| match d {
            Drive::Powered { direction, .. } => Drive::Powered { direction, magnitude },
            idle => idle,
        });
        Ok(())
    }

    fn set_idle(
        &mut self,
        mode: IdleMode,
    ) -> Result<(), Infallible> {
        self.0.update(|_| Drive::Idle(mode));
        Ok(())
    }
}

/// First-order DC motor models feeding the encoders.
pub struct Plant {
    wheels: &'static [PlantWheel; 4],
    omega: [f32; 4],
    residual: [f32; 4],
    /// Output rate at full PWM (rad/s).
    no_load_omega: f32,
    counts_per_rev: f32,
    dt: f32,
}

impl Plant {
    pub fn new(
        wheels: &'static [PlantWheel; 4],
        motor: &MotorConfig,
    ) -> Self {
        Self {
            wheels,
            omega: [0.0; 4],
            residual: [0.0; 4],
            no_load_omega: motor.max_omega * 1.2,
            counts_per_rev: 4.0 * motor.encoder_lines as f32 * motor.reduction_ratio,
            dt: motor.heartbeat_period_s,
        }
    }

    /// Integrate one base tick and push the encoder edges it produced.
    pub fn step(&mut self) {
        for (i, wheel) in self.wheels.iter().enumerate() {
            let drive = wheel.drive.lock(|c| c.get());
            let (goal, tau) = match drive {
                Drive::Powered { direction, magnitude } => {
                    let sign = match direction {
                        Direction::Forward => 1.0,
                        Direction::Reverse => -1.0,
                    };
                    let duty = magnitude as f32 / PWM_PERIOD as f32;
                    (sign * duty * self.no_load_omega, DRIVE_TAU)
                }
                Drive::Idle(IdleMode::Float) => (0.0, COAST_TAU),
                Drive::Idle(IdleMode::Brake) => (0.0, BRAKE_TAU),
            };
            self.omega[i] += (goal - self.omega[i]) * self.dt / tau;

            let counts = self.residual[i] + self.omega[i] * self.dt / (2.0 * PI) * self.counts_per_rev;
            let whole = counts.trunc();
            self.residual[i] = counts - whole;
            wheel.encoder.add(whole as i32);
        }
    }

    pub fn omega(&self) -> [f32; 4] {
        self.omega
    }
}

/// Host computer issuing periodic chassis commands.
pub struct SimHost {
    head: u32,
    rx_len: usize,
    command: ChassisCommandPayload,
    corrupt_every: Option<u32>,
    silent_after_ticks: Option<u64>,
    silent: bool,
    elapsed_ticks: u64,
    sent: u32,
}

impl SimHost {
    pub fn new(
        head: u32,
        rx_len: usize,
        (vx, vy, omega): (f32, f32, f32),
        corrupt_every: Option<u32>,
        silent_after_ticks: Option<u64>,
    ) -> Self {
        Self {
            head,
            rx_len,
            command: ChassisCommandPayload {
                state: ChassisState::Running,
                vx,
                vy,
                omega,
            },
            corrupt_every: corrupt_every.filter(|n| *n > 0),
            silent_after_ticks,
            silent: false,
            elapsed_ticks: 0,
            sent: 0,
        }
    }

    /// Build the frame due after `period_ticks` more base ticks, if any.
    pub fn next_frame(
        &mut self,
        period_ticks: u64,
        out: &mut [u8; MAX_FRAME_LEN],
    ) -> Option<usize> {
        self.elapsed_ticks += period_ticks;
        if !self.silent && self.silent_after_ticks.is_some_and(|t| self.elapsed_ticks > t) {
            self.silent = true;
            info!(elapsed_ticks = self.elapsed_ticks, "host went silent");
        }
        if self.silent {
            return None;
        }

        let len = self.rx_len;
        let buf = &mut out[..len];
        buf.fill(0);
        if let Err(e) = protocol::encode(&self.command, &mut buf[PAYLOAD_OFFSET..len - 1]) {
            warn!(%e, "command does not fit the downlink frame");
            return None;
        }
        if let Err(e) = frame::seal(buf, self.head, PacketType::ChassisCommand.into()) {
            warn!(%e, "cannot seal command frame");
            return None;
        }

        self.sent += 1;
        if self.corrupt_every.is_some_and(|n| self.sent % n == 0) {
            let bit = (self.sent as usize * 7) % (len * 8);
            buf[bit / 8] ^= 1 << (bit % 8);
            debug!(frame = self.sent, bit, "corrupting command frame");
        }
        Some(len)
    }
}

/// Host side of the uplink: decodes telemetry as it is "transmitted".
pub struct HostPort {
    head: u32,
    received: u32,
    log_every: u32,
}

impl HostPort {
    pub fn new(
        head: u32,
        log_every: u32,
    ) -> Self {
        Self {
            head,
            received: 0,
            log_every: log_every.max(1),
        }
    }

    pub fn received(&self) -> u32 {
        self.received
    }
}

impl Transport for HostPort {
    type Error = Infallible;

    fn send(
        &mut self,
        bytes: &[u8],
    ) -> Result<(), Infallible> {
        let (packet_type, payload) = match frame::validate(bytes, self.head) {
            Ok(v) => v,
            Err(e) => {
                warn!(%e, "host rejected telemetry frame");
                return Ok(());
            }
        };
        self.received += 1;
        let loud = self.received % self.log_every == 0;

        match PacketType::try_from(packet_type) {
            Ok(PacketType::WheelTelemetry) => match protocol::decode::<WheelTelemetryPayload>(payload) {
                Ok(t) if loud => info!(wheel_omega = ?t.wheel_omega, "telemetry"),
                Ok(t) => debug!(wheel_omega = ?t.wheel_omega, "telemetry"),
                Err(e) => warn!(%e, "bad wheel telemetry"),
            },
            Ok(PacketType::BodyTwist) => match protocol::decode::<BodyTwistPayload>(payload) {
                Ok(t) => debug!(vx = t.vx, vy = t.vy, omega = t.omega, "body twist"),
                Err(e) => warn!(%e, "bad body twist"),
            },
            Ok(other) => warn!(?other, "unexpected uplink packet"),
            Err(e) => warn!(%e, "unknown uplink packet"),
        }
        Ok(())
    }
}
