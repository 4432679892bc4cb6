//! Discrete PID controller for the wheel velocity loops.
//!
//! Works in `no_std` and does not allocate memory.

use serde::{Deserialize, Serialize};

/// Gains and limits of a [`PidController`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Bound on the accumulated `error * dt` term.
    pub integral_limit: f32,
    /// Bound on the controller output.
    pub output_limit: f32,
    /// Sample period in seconds.
    pub sample_period: f32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 5.0,
            kd: 0.0,
            integral_limit: 10.0,
            output_limit: 20.0,
            sample_period: 0.05,
        }
    }
}

/// A discrete PID controller with clamped integral and output.
///
/// Usage follows a set/calculate/get cycle:
/// [`set_target`](Self::set_target), [`set_actual`](Self::set_actual),
/// [`calculate`](Self::calculate), then [`output`](Self::output).
#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,

    target: f32,
    actual: f32,

    /// Accumulated `error * dt`, kept within `±integral_limit`
    integral: f32,
    prev_error: f32,
    first_update: bool,

    output: f32,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        let mut pid = Self {
            config: PidConfig::default(),
            target: 0.0,
            actual: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            first_update: true,
            output: 0.0,
        };
        pid.configure(config);
        pid
    }

    /// Replace gains and limits. Negative limits are taken by magnitude.
    pub fn configure(&mut self, config: PidConfig) {
        self.config = PidConfig {
            integral_limit: libm::fabsf(config.integral_limit),
            output_limit: libm::fabsf(config.output_limit),
            ..config
        };
        self.integral = self
            .integral
            .clamp(-self.config.integral_limit, self.config.integral_limit);
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn set_actual(&mut self, actual: f32) {
        self.actual = actual;
    }

    pub fn set_output_limit(&mut self, limit: f32) {
        self.config.output_limit = libm::fabsf(limit);
    }

    /// Zero the integrator and drop the derivative history.
    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.first_update = true;
    }

    /// Run one controller step and return the clamped output.
    pub fn calculate(&mut self) -> f32 {
        let PidConfig {
            kp,
            ki,
            kd,
            integral_limit,
            output_limit,
            sample_period,
        } = self.config;

        let error = self.target - self.actual;

        self.integral = (self.integral + error * sample_period).clamp(-integral_limit, integral_limit);

        let derivative = if self.first_update || sample_period <= 0.0 {
            self.first_update = false;
            0.0
        } else {
            (error - self.prev_error) / sample_period
        };
        self.prev_error = error;

        self.output = (kp * error + ki * self.integral + kd * derivative).clamp(-output_limit, output_limit);
        self.output
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn target(&self) -> f32 {
        self.target
    }
}
