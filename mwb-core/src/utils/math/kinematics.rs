//! Kinematics utilities for four-wheeled mecanum robots.
//!
//! The `MecanumKinematics` struct maps a body-frame twist onto wheel angular
//! rates, scales those rates uniformly when any wheel would exceed its rated
//! speed, and inverts measured wheel rates back to a body twist.
//!
//! Frame convention: +X forward, +Y left, positive omega counter-clockwise.
//! Wheel 0 sits in the first quadrant, wheel 2 in the second, wheel 3 in the
//! third and wheel 1 in the fourth.
//!
//! # Example
//! ```rust
//! use mwb_core::utils::math::kinematics::MecanumKinematics;
//! let kin = MecanumKinematics::new(0.0635, 0.8, 0.8);
//! let (_, scale) = kin.wheel_targets(0.1, 0.0, 0.0, 26.0).unwrap();
//! assert_eq!(scale, 1.0);
//! ```

/// Represents the kinematics of a four-wheeled mecanum chassis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MecanumKinematics {
    /// Radius of each wheel (m)
    wheel_radius: f32,
    /// Half of (track + base), the lever arm of the yaw term (m)
    half_span: f32,
}

impl MecanumKinematics {
    /// Instantiate with the wheel radius, the left/right track and the
    /// front/back wheel base.
    pub fn new(
        wheel_radius: f32,
        wheel_track: f32,
        wheel_base: f32,
    ) -> Self {
        Self {
            wheel_radius,
            half_span: (wheel_track + wheel_base) / 2.0,
        }
    }

    /// Compute the preliminary wheel angular rates (rad/s) for a body twist.
    ///
    /// `vx`/`vy` are in m/s and `omega` in rad/s. The result is not limited.
    pub fn compute_wheel_velocities(
        &self,
        vx: f32,
        vy: f32,
        omega: f32,
    ) -> [f32; 4] {
        let r = self.wheel_radius;
        let yaw = omega * self.half_span;
        [
            (vx - vy - yaw) / r,
            -(vx + vy + yaw) / r,
            (vx + vy - yaw) / r,
            -(vx - vy + yaw) / r,
        ]
    }

    /// Scale `rates` uniformly so that no wheel exceeds `max_omega`.
    ///
    /// Returns the scaled rates together with the factor that was applied,
    /// which is always within `(0, 1]` for a positive `max_omega`. Sign and
    /// ratio between the wheels are left untouched, so saturation never turns
    /// into an unintended yaw. `None` if any rate is infinite or NaN.
    pub fn saturate(
        &self,
        rates: [f32; 4],
        max_omega: f32,
    ) -> Option<([f32; 4], f32)> {
        if !rates.iter().all(|w| w.is_finite()) {
            return None;
        }
        let peak = peak_rate(&rates);

        let scale = if peak > max_omega && max_omega > 0.0 {
            max_omega / peak
        } else {
            1.0
        };

        Some((rates.map(|w| w * scale), scale))
    }

    /// Wheel rates for a body twist, uniformly saturated to `max_omega`.
    ///
    /// Twists large enough to overflow the preliminary rates are normalised
    /// first, so every finite command still yields finite rates and a factor
    /// in `(0, 1]`. `None` for a non-finite command.
    pub fn wheel_targets(
        &self,
        vx: f32,
        vy: f32,
        omega: f32,
        max_omega: f32,
    ) -> Option<([f32; 4], f32)> {
        if !(vx.is_finite() && vy.is_finite() && omega.is_finite()) {
            return None;
        }
        if let Some(saturated) = self.saturate(self.compute_wheel_velocities(vx, vy, omega), max_omega) {
            return Some(saturated);
        }

        // overflow: the unit twist has the same wheel ratios
        let norm = libm::fabsf(vx).max(libm::fabsf(vy)).max(libm::fabsf(omega));
        let unit = self.compute_wheel_velocities(vx / norm, vy / norm, omega / norm);
        let peak = peak_rate(&unit);
        if !peak.is_finite() || peak <= 0.0 || max_omega <= 0.0 {
            return None;
        }
        let gain = max_omega / peak;
        Some((unit.map(|w| w * gain), gain / norm))
    }

    /// Recover the body twist from measured wheel rates.
    ///
    /// # Returns
    ///
    /// `(vx, vy, ω)` where `vx`/`vy` are linear body-frame velocities and `ω` is angular velocity.
    pub fn compute_body_velocity(
        &self,
        wheel_velocity: [f32; 4],
    ) -> (f32, f32, f32) {
        let r = self.wheel_radius;
        let a = r * wheel_velocity[0];
        let b = -r * wheel_velocity[1];
        let c = r * wheel_velocity[2];
        let d = -r * wheel_velocity[3];

        let vx = (a + b + c + d) / 4.0;
        let vy = (-a + b + c - d) / 4.0;
        let w = if self.half_span != 0.0 {
            (-a + b - c + d) / (4.0 * self.half_span)
        } else {
            0.0
        };
        (vx, vy, w)
    }
}

fn peak_rate(rates: &[f32; 4]) -> f32 {
    rates.iter().fold(0.0f32, |acc, &w| acc.max(libm::fabsf(w)))
}
