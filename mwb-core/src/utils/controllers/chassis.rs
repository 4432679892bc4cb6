//! Mecanum chassis state machine and wheel-target distribution.
//!
//! The command side ([`ChassisCommand`]) is shared between the receive path
//! and the control tick, the control side ([`MecanumChassis`]) owns the four
//! wheel actuators and runs only from the base tick.

use core::{cell::Cell, fmt};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use serde::{Deserialize, Serialize};

use super::{
    driver::{EncoderSource, WheelOutput},
    motor::{MotorActuator, MotorState},
};
use crate::utils::{math::kinematics::MecanumKinematics, scheduler::Decimator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChassisState {
    #[default]
    Disabled = 0,
    Suspended = 1,
    Braked = 2,
    Running = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisRequest {
    Enable,
    Disable,
    Motion,
    Stop(ChassisState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    ChassisDisabled,
    InvalidStopTarget(ChassisState),
    /// Infinite or NaN body twist.
    NonFiniteMotion,
}

impl fmt::Display for TransitionError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::ChassisDisabled => write!(f, "chassis is disabled"),
            Self::InvalidStopTarget(s) => write!(f, "{s:?} is not a stop state"),
            Self::NonFiniteMotion => write!(f, "motion command is not finite"),
        }
    }
}

impl ChassisState {
    /// Transition table of the chassis state machine.
    ///
    /// | from \ request | Enable    | Disable  | Motion  | Stop(Suspended/Braked) |
    /// |----------------|-----------|----------|---------|------------------------|
    /// | Disabled       | Suspended | Disabled | error   | error                  |
    /// | other          | unchanged | Disabled | Running | target                 |
    pub fn transition(
        self,
        request: ChassisRequest,
    ) -> Result<ChassisState, TransitionError> {
        use ChassisState::*;

        match (self, request) {
            (Disabled, ChassisRequest::Enable) => Ok(Suspended),
            (state, ChassisRequest::Enable) => Ok(state),
            (_, ChassisRequest::Disable) => Ok(Disabled),
            (Disabled, _) => Err(TransitionError::ChassisDisabled),
            (_, ChassisRequest::Motion) => Ok(Running),
            (_, ChassisRequest::Stop(target @ (Suspended | Braked))) => Ok(target),
            (_, ChassisRequest::Stop(target)) => Err(TransitionError::InvalidStopTarget(target)),
        }
    }

    /// Wheel pattern for a non-running state.
    fn wheel_stop(self) -> Option<MotorState> {
        match self {
            ChassisState::Disabled | ChassisState::Suspended => Some(MotorState::Suspended),
            ChassisState::Braked => Some(MotorState::Braked),
            ChassisState::Running => None,
        }
    }
}

/// One consistent view of the commanded chassis motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSnapshot {
    pub state: ChassisState,
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

impl CommandSnapshot {
    const IDLE: Self = Self {
        state: ChassisState::Disabled,
        vx: 0.0,
        vy: 0.0,
        omega: 0.0,
    };
}

/// Commanded chassis state, shared across interrupt contexts.
///
/// Every update swaps the whole snapshot inside a critical section, so a
/// reader never sees `vx` from one command and `omega` from another.
pub struct ChassisCommand {
    inner: Mutex<CriticalSectionRawMutex, Cell<CommandSnapshot>>,
}

impl Default for ChassisCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl ChassisCommand {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(CommandSnapshot::IDLE)),
        }
    }

    pub fn snapshot(&self) -> CommandSnapshot {
        self.inner.lock(|c| c.get())
    }

    pub fn state(&self) -> ChassisState {
        self.snapshot().state
    }

    pub fn enable(&self) -> Result<ChassisState, TransitionError> {
        self.apply(ChassisRequest::Enable, None)
    }

    /// Return to `Disabled` from any state and drop the commanded motion.
    pub fn disable(&self) -> Result<ChassisState, TransitionError> {
        self.apply(ChassisRequest::Disable, None)
    }

    /// Store a body twist and enter `Running`. Rejected while disabled and
    /// for non-finite components.
    pub fn set_motion(
        &self,
        vx: f32,
        vy: f32,
        omega: f32,
    ) -> Result<ChassisState, TransitionError> {
        if !(vx.is_finite() && vy.is_finite() && omega.is_finite()) {
            tracing::debug!(vx, vy, omega, "non-finite motion rejected");
            return Err(TransitionError::NonFiniteMotion);
        }
        self.apply(ChassisRequest::Motion, Some((vx, vy, omega)))
    }

    /// Enter `Suspended` or `Braked`. Rejected while disabled.
    pub fn set_stop(
        &self,
        target: ChassisState,
    ) -> Result<ChassisState, TransitionError> {
        self.apply(ChassisRequest::Stop(target), None)
    }

    /// Zero the stored twist unless the chassis is running.
    fn settle(&self) {
        self.inner.lock(|c| {
            let mut snap = c.get();
            if snap.state != ChassisState::Running {
                snap.vx = 0.0;
                snap.vy = 0.0;
                snap.omega = 0.0;
                c.set(snap);
            }
        })
    }

    fn apply(
        &self,
        request: ChassisRequest,
        motion: Option<(f32, f32, f32)>,
    ) -> Result<ChassisState, TransitionError> {
        let result: Result<(ChassisState, ChassisState), TransitionError> = self.inner.lock(|c| {
            let mut snap = c.get();
            let previous = snap.state;
            let next = previous.transition(request)?;

            snap.state = next;
            match motion {
                Some((vx, vy, omega)) => {
                    snap.vx = vx;
                    snap.vy = vy;
                    snap.omega = omega;
                }
                None if next == ChassisState::Disabled => {
                    snap.vx = 0.0;
                    snap.vy = 0.0;
                    snap.omega = 0.0;
                }
                None => {}
            }
            c.set(snap);
            Ok((previous, next))
        });

        match result {
            Ok((previous, next)) => {
                if previous != next {
                    tracing::info!(?previous, ?next, "chassis state changed");
                }
                Ok(next)
            }
            Err(e) => {
                tracing::debug!(?request, error = %e, "chassis request rejected");
                Err(e)
            }
        }
    }
}

/// Geometry and limits of the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub wheel_radius: f32,
    /// Left-right distance between wheel contact points.
    pub wheel_track: f32,
    /// Front-rear distance between wheel contact points.
    pub wheel_base: f32,
    /// Rated wheel rate (rad/s) used for uniform saturation.
    pub max_wheel_omega: f32,
    /// Control period in base ticks.
    pub control_period: u32,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            wheel_radius: 0.0635,
            wheel_track: 0.8,
            wheel_base: 0.8,
            max_wheel_omega: 26.0,
            control_period: 50,
        }
    }
}

/// Snapshot of wheel and body rates for the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisTelemetry {
    pub state: ChassisState,
    /// Rates handed to each wheel actuator (rad/s).
    pub target: [f32; 4],
    /// Encoder-measured rates (rad/s).
    pub measured: [f32; 4],
    /// Body twist estimated from the measured rates: (vx, vy, omega).
    pub twist: (f32, f32, f32),
}

pub struct MecanumChassis<'a, E, O> {
    config: ChassisConfig,
    kinematics: MecanumKinematics,
    command: &'a ChassisCommand,
    wheels: [MotorActuator<E, O>; 4],
    gate: Decimator,
    scale: f32,
}

impl<'a, E, O> MecanumChassis<'a, E, O>
where
    E: EncoderSource,
    O: WheelOutput,
{
    pub fn new(
        config: ChassisConfig,
        command: &'a ChassisCommand,
        wheels: [MotorActuator<E, O>; 4],
    ) -> Self {
        Self {
            kinematics: MecanumKinematics::new(config.wheel_radius, config.wheel_track, config.wheel_base),
            gate: Decimator::new(config.control_period),
            config,
            command,
            wheels,
            scale: 1.0,
        }
    }

    pub fn enable(&self) -> Result<ChassisState, TransitionError> {
        self.command.enable()
    }

    pub fn disable(&self) -> Result<ChassisState, TransitionError> {
        self.command.disable()
    }

    pub fn set_motion(
        &self,
        vx: f32,
        vy: f32,
        omega: f32,
    ) -> Result<ChassisState, TransitionError> {
        self.command.set_motion(vx, vy, omega)
    }

    pub fn set_stop(
        &self,
        target: ChassisState,
    ) -> Result<ChassisState, TransitionError> {
        self.command.set_stop(target)
    }

    /// Advance every wheel actuator by one base tick.
    pub fn tick_wheels(&mut self) {
        for wheel in self.wheels.iter_mut() {
            wheel.tick();
        }
    }

    /// Base tick entry point; re-targets the wheels once per control period.
    pub fn tick(&mut self) {
        if !self.gate.tick() {
            return;
        }

        let cmd = self.command.snapshot();
        if let Some(stop) = cmd.state.wheel_stop() {
            self.command.settle();
            self.stop_wheels(stop);
            return;
        }

        let targets = self
            .kinematics
            .wheel_targets(cmd.vx, cmd.vy, cmd.omega, self.config.max_wheel_omega);
        match targets {
            Some((scaled, scale)) => {
                self.scale = scale;
                for (wheel, rate) in self.wheels.iter_mut().zip(scaled) {
                    wheel.set_motion(rate);
                }
                tracing::trace!(?scaled, scale, "chassis wheel targets");
            }
            None => {
                tracing::warn!(vx = cmd.vx, vy = cmd.vy, omega = cmd.omega, "no finite wheel targets, suspending wheels");
                self.stop_wheels(MotorState::Suspended);
            }
        }
    }

    fn stop_wheels(
        &mut self,
        stop: MotorState,
    ) {
        self.scale = 1.0;
        for wheel in self.wheels.iter_mut() {
            // stop targets are always accepted
            let _ = wheel.set_stop(stop);
        }
    }

    pub fn state(&self) -> ChassisState {
        self.command.state()
    }

    pub fn command(&self) -> &'a ChassisCommand {
        self.command
    }

    /// Uniform saturation factor applied on the last running control tick.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn config(&self) -> &ChassisConfig {
        &self.config
    }

    pub fn kinematics(&self) -> &MecanumKinematics {
        &self.kinematics
    }

    pub fn wheel(
        &self,
        index: usize,
    ) -> Option<&MotorActuator<E, O>> {
        self.wheels.get(index)
    }

    pub fn wheels_mut(&mut self) -> &mut [MotorActuator<E, O>; 4] {
        &mut self.wheels
    }

    pub fn telemetry(&self) -> ChassisTelemetry {
        let target = core::array::from_fn(|i| self.wheels[i].set_speed());
        let measured = core::array::from_fn(|i| self.wheels[i].actual_omega());
        ChassisTelemetry {
            state: self.state(),
            target,
            measured,
            twist: self.kinematics.compute_body_velocity(measured),
        }
    }
}
