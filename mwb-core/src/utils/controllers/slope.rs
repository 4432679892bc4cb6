//! Slope (ramp) limiter applied to a setpoint before closed-loop control.

/// Moves its output toward a target by at most `step` per [`advance`](Self::advance).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeLimiter {
    step: f32,
    target: f32,
    output: f32,
}

impl SlopeLimiter {
    pub fn new(step: f32) -> Self {
        Self {
            step: libm::fabsf(step),
            target: 0.0,
            output: 0.0,
        }
    }

    pub fn set_step(&mut self, step: f32) {
        self.step = libm::fabsf(step);
    }

    /// Store a new target and return it.
    pub fn set_target(&mut self, target: f32) -> f32 {
        self.target = target;
        self.target
    }

    /// Advance the output one step toward the target and return it.
    pub fn advance(&mut self) -> f32 {
        let delta = self.target - self.output;
        self.output = if libm::fabsf(delta) <= self.step {
            self.target
        } else if delta > 0.0 {
            self.output + self.step
        } else if delta < 0.0 {
            self.output - self.step
        } else {
            // NaN target: hold
            self.output
        };
        self.output
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    /// Snap both target and output back to zero.
    pub fn reset(&mut self) {
        self.target = 0.0;
        self.output = 0.0;
    }
}
