/// Divides a fixed-rate tick down to every `period`-th call.
///
/// The internal count always stays in `[0, period)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimator {
    period: u32,
    count: u32,
}

impl Decimator {
    /// A period of 0 behaves like 1 (fire on every call).
    pub const fn new(period: u32) -> Self {
        Self {
            period: if period == 0 { 1 } else { period },
            count: 0,
        }
    }

    /// Advance one base tick; returns `true` on the tick that completes a period.
    #[inline]
    pub fn tick(&mut self) -> bool {
        if self.count + 1 < self.period {
            self.count += 1;
            false
        } else {
            self.count = 0;
            true
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn period(&self) -> u32 {
        self.period
    }
}
