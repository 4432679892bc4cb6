//! Hardware seams of a wheel: encoder input and H-bridge output.
//!
//! The actuator logic only talks to [`EncoderSource`] and [`WheelOutput`].
//! [`HBridge`] implements the output side on top of `embedded-hal` pins and a
//! PWM channel, [`AtomicEncoder`] implements the input side for counters that
//! are fed from an interrupt.

use core::sync::atomic::{AtomicI32, Ordering};

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

/// Rotation sense of a driven wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Pattern applied to an H-bridge that is not being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleMode {
    /// Both half-bridges released; the wheel coasts.
    Float,
    /// Both low sides on; the wheel is short-braked.
    Brake,
}

/// Source of encoder counts accumulated since the previous read.
pub trait EncoderSource {
    /// Return the counts since the last call and start a new window.
    fn take_delta(&mut self) -> i32;
}

/// Abstract wheel output stage.
pub trait WheelOutput {
    type Error: core::fmt::Debug;

    /// Largest magnitude accepted by [`set_magnitude`](Self::set_magnitude).
    fn max_magnitude(&self) -> u16;

    fn set_direction(
        &mut self,
        direction: Direction,
    ) -> Result<(), Self::Error>;

    fn set_magnitude(
        &mut self,
        magnitude: u16,
    ) -> Result<(), Self::Error>;

    fn set_idle(
        &mut self,
        mode: IdleMode,
    ) -> Result<(), Self::Error>;
}

/// Errors raised by an [`HBridge`].
#[derive(Debug)]
pub enum HBridgeError<PinE: core::fmt::Debug, PwmE: core::fmt::Debug> {
    Pin(PinE),
    Pwm(PwmE),
}

/// Dual direction-line H-bridge with a PWM enable channel.
///
/// Line patterns `(a, b)`: forward `(low, high)`, reverse `(high, low)`,
/// float `(high, high)`, brake `(low, low)`.
pub struct HBridge<A, B, P> {
    dir_a: A,
    dir_b: B,
    pwm: P,
}

impl<A, B, P> HBridge<A, B, P>
where
    A: OutputPin,
    B: OutputPin<Error = A::Error>,
    P: SetDutyCycle,
{
    pub fn new(
        dir_a: A,
        dir_b: B,
        pwm: P,
    ) -> Self {
        Self { dir_a, dir_b, pwm }
    }

    /// Release the pins and the PWM channel.
    pub fn free(self) -> (A, B, P) {
        (self.dir_a, self.dir_b, self.pwm)
    }

    fn drive_lines(
        &mut self,
        a_high: bool,
        b_high: bool,
    ) -> Result<(), HBridgeError<A::Error, P::Error>> {
        if a_high {
            self.dir_a.set_high().map_err(HBridgeError::Pin)?;
        } else {
            self.dir_a.set_low().map_err(HBridgeError::Pin)?;
        }
        if b_high {
            self.dir_b.set_high().map_err(HBridgeError::Pin)?;
        } else {
            self.dir_b.set_low().map_err(HBridgeError::Pin)?;
        }
        Ok(())
    }
}

impl<A, B, P> WheelOutput for HBridge<A, B, P>
where
    A: OutputPin,
    B: OutputPin<Error = A::Error>,
    P: SetDutyCycle,
{
    type Error = HBridgeError<A::Error, P::Error>;

    fn max_magnitude(&self) -> u16 {
        self.pwm.max_duty_cycle()
    }

    fn set_direction(
        &mut self,
        direction: Direction,
    ) -> Result<(), Self::Error> {
        match direction {
            Direction::Forward => self.drive_lines(false, true),
            Direction::Reverse => self.drive_lines(true, false),
        }
    }

    fn set_magnitude(
        &mut self,
        magnitude: u16,
    ) -> Result<(), Self::Error> {
        let duty = magnitude.min(self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(duty).map_err(HBridgeError::Pwm)
    }

    fn set_idle(
        &mut self,
        mode: IdleMode,
    ) -> Result<(), Self::Error> {
        match mode {
            IdleMode::Float => self.drive_lines(true, true),
            IdleMode::Brake => self.drive_lines(false, false),
        }
    }
}

/// Encoder count accumulator written from an edge/overflow interrupt.
#[derive(Debug, Default)]
pub struct AtomicEncoder {
    count: AtomicI32,
}

impl AtomicEncoder {
    pub const fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
        }
    }

    /// Accumulate `delta` counts.
    #[inline]
    pub fn add(&self, delta: i32) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Counts accumulated since the last [`EncoderSource::take_delta`].
    #[inline]
    pub fn pending(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl EncoderSource for &AtomicEncoder {
    fn take_delta(&mut self) -> i32 {
        self.count.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_encoder_resets_on_take() {
        let enc = AtomicEncoder::new();
        enc.add(40);
        enc.add(-12);
        assert_eq!(enc.pending(), 28);

        let mut source = &enc;
        assert_eq!(source.take_delta(), 28);
        assert_eq!(source.take_delta(), 0);
    }
}
