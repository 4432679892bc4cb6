//! Closed-loop velocity actuator for a single encoder-equipped DC wheel.
//!
//! Each [`MotorActuator`] chains a [`SlopeLimiter`] in front of a
//! [`PidController`] and runs the pair once every `control_period` base ticks.

use core::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::{
    driver::{Direction, EncoderSource, IdleMode, WheelOutput},
    pid::{PidConfig, PidController},
    slope::SlopeLimiter,
};
use crate::utils::scheduler::Decimator;

/// Quadrature decoding counts both edges of both channels.
const EDGES_PER_LINE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorState {
    Suspended,
    Braked,
    Running,
}

/// Static description of one wheel drive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Rated wheel speed in rad/s; also the PID output bound.
    pub max_omega: f32,
    pub reduction_ratio: f32,
    pub encoder_lines: u16,
    /// Control period in base ticks.
    pub control_period: u32,
    /// Base tick length in seconds.
    pub heartbeat_period_s: f32,
    /// Slope limiter step in rad/s per control period.
    pub slope_step: f32,
    pub pid: PidConfig,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            max_omega: 20.0,
            reduction_ratio: 14.0,
            encoder_lines: 13,
            control_period: 50,
            heartbeat_period_s: 0.001,
            slope_step: 5.0,
            pid: PidConfig::default(),
        }
    }
}

impl MotorConfig {
    /// Length of one control period in seconds.
    pub fn control_period_s(&self) -> f32 {
        self.control_period as f32 * self.heartbeat_period_s
    }

    /// Wheel rate in rad/s for `delta` encoder counts over one control period.
    pub fn counts_to_omega(
        &self,
        delta: i32,
    ) -> f32 {
        let counts_per_rev = EDGES_PER_LINE * self.encoder_lines as f32 * self.reduction_ratio;
        let window = self.control_period_s();
        if counts_per_rev <= 0.0 || window <= 0.0 {
            return 0.0;
        }
        delta as f32 / counts_per_rev / window * 2.0 * PI
    }
}

pub struct MotorActuator<E, O> {
    config: MotorConfig,
    encoder: E,
    driver: O,
    pid: PidController,
    slope: SlopeLimiter,
    gate: Decimator,

    state: MotorState,
    set_speed: f32,
    target_omega: f32,
    actual_omega: f32,
    output: f32,
}

impl<E, O> MotorActuator<E, O>
where
    E: EncoderSource,
    O: WheelOutput,
{
    /// The PID sample period is taken from the control period, whatever
    /// `config.pid.sample_period` says.
    pub fn new(
        mut config: MotorConfig,
        encoder: E,
        driver: O,
    ) -> Self {
        config.pid.sample_period = config.control_period_s();
        let mut pid = PidController::new(config.pid);
        pid.set_output_limit(config.max_omega);

        Self {
            config,
            encoder,
            driver,
            pid,
            slope: SlopeLimiter::new(config.slope_step),
            gate: Decimator::new(config.control_period),
            state: MotorState::Suspended,
            set_speed: 0.0,
            target_omega: 0.0,
            actual_omega: 0.0,
            output: 0.0,
        }
    }

    /// Request a wheel rate and enter `Running`. Returns the rate after
    /// clamping to the rated maximum. A non-finite rate is refused and the
    /// current setpoint returned unchanged.
    pub fn set_motion(
        &mut self,
        omega: f32,
    ) -> f32 {
        if !omega.is_finite() {
            tracing::debug!(omega, "non-finite wheel rate refused");
            return self.set_speed;
        }
        let max = libm::fabsf(self.config.max_omega);
        self.set_speed = omega.clamp(-max, max);
        self.state = MotorState::Running;
        self.set_speed
    }

    /// Enter `Suspended` or `Braked`. Any other target is handed back unchanged.
    pub fn set_stop(
        &mut self,
        target: MotorState,
    ) -> Result<(), MotorState> {
        match target {
            MotorState::Suspended | MotorState::Braked => {
                self.state = target;
                Ok(())
            }
            MotorState::Running => Err(target),
        }
    }

    /// Base tick entry point; the control body runs once per control period.
    pub fn tick(&mut self) {
        if !self.gate.tick() {
            return;
        }

        let delta = self.encoder.take_delta();
        self.actual_omega = self.config.counts_to_omega(delta);

        match self.state {
            MotorState::Suspended => self.idle(IdleMode::Float),
            MotorState::Braked => self.idle(IdleMode::Brake),
            MotorState::Running => {
                self.slope.set_target(self.set_speed);
                self.target_omega = self.slope.advance();

                self.pid.set_target(self.target_omega);
                self.pid.set_actual(self.actual_omega);
                self.output = self.pid.calculate();

                self.drive(self.output);
            }
        }

        tracing::trace!(
            state = ?self.state,
            target = self.target_omega,
            actual = self.actual_omega,
            output = self.output,
            "motor tick"
        );
    }

    fn idle(
        &mut self,
        mode: IdleMode,
    ) {
        self.set_speed = 0.0;
        self.target_omega = 0.0;
        self.output = 0.0;
        self.pid.set_target(0.0);
        self.pid.reset_integral();
        self.slope.reset();

        if let Err(e) = self.driver.set_idle(mode) {
            tracing::warn!(?e, ?mode, "wheel idle pattern failed");
        }
    }

    fn drive(
        &mut self,
        output: f32,
    ) {
        let direction = if output > 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        let magnitude = self.magnitude(output);

        if let Err(e) = self.driver.set_direction(direction) {
            tracing::warn!(?e, ?direction, "wheel direction failed");
        }
        if let Err(e) = self.driver.set_magnitude(magnitude) {
            tracing::warn!(?e, magnitude, "wheel magnitude failed");
        }
    }

    /// Scale `|output|` against the rated maximum onto the output stage range.
    fn magnitude(
        &self,
        output: f32,
    ) -> u16 {
        let full_scale = self.driver.max_magnitude();
        let max = libm::fabsf(self.config.max_omega);
        if max <= 0.0 {
            return 0;
        }
        let scaled = libm::fabsf(output) / max * full_scale as f32;
        (scaled as u16).min(full_scale)
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    /// Requested (clamped) rate before the slope limiter.
    pub fn set_speed(&self) -> f32 {
        self.set_speed
    }

    /// Slope-limited rate fed to the PID.
    pub fn target_omega(&self) -> f32 {
        self.target_omega
    }

    pub fn actual_omega(&self) -> f32 {
        self.actual_omega
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn pid_mut(&mut self) -> &mut PidController {
        &mut self.pid
    }

    pub fn slope_mut(&mut self) -> &mut SlopeLimiter {
        &mut self.slope
    }

    pub fn driver(&self) -> &O {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut O {
        &mut self.driver
    }

    pub fn encoder_mut(&mut self) -> &mut E {
        &mut self.encoder
    }

    /// Give back the encoder and the output stage.
    pub fn release(self) -> (E, O) {
        (self.encoder, self.driver)
    }
}
