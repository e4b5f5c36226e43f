use quanta::Clock;
use quanta::Instant as QuantaInstant;

/// Millisecond clock abstraction used throughout the metric substrate.
///
/// All bucket alignment, window math and shaper arithmetic is done in
/// milliseconds since an arbitrary per-process anchor rather than wall-clock
/// epoch time, so a single `TimeSource` can be swapped for a mock in tests
/// without touching call sites.
#[derive(Clone, Debug)]
pub struct TimeSource {
    clock: Clock,
    anchor: QuantaInstant,
}

impl TimeSource {
    pub fn new() -> Self {
        let clock = Clock::new();
        let anchor = clock.now();
        Self { clock, anchor }
    }

    #[cfg(test)]
    pub(crate) fn mock() -> (Self, quanta::Mock) {
        let (clock, mock) = Clock::mock();
        let anchor = clock.now();
        (Self { clock, anchor }, mock)
    }

    /// Milliseconds elapsed since this `TimeSource` was created.
    #[inline]
    pub fn now_millis(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_millis() as u64
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}
