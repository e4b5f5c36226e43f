use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Slots inside a [`Bucket`]'s counter array, in fixed declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MetricEvent {
    Pass = 0,
    Block = 1,
    Exception = 2,
    Success = 3,
    Rt = 4,
    OccupiedPass = 5,
}

pub(crate) const EVENT_COUNT: usize = 6;

/// A single time-aligned counter cell.
///
/// `window_start` and the six counters are independent atomics: writers
/// never block each other, and a reader may observe a value mid-update
///. The only hard invariant is that counters never decrease
/// within a bucket's live window, which holds because resets only ever
/// zero a *stale* bucket before handing it back to callers.
#[derive(Debug)]
pub struct Bucket {
    window_start: AtomicU64,
    counters: [AtomicU64; EVENT_COUNT],
}

impl Bucket {
    pub fn new(window_start: u64) -> Self {
        Self {
            window_start: AtomicU64::new(window_start),
            counters: Default::default(),
        }
    }

    #[inline]
    pub fn window_start(&self) -> u64 {
        self.window_start.load(Ordering::Acquire)
    }

    #[inline]
    pub fn add(&self, event: MetricEvent, count: u64) {
        self.counters[event as usize].fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, event: MetricEvent) -> u64 {
        self.counters[event as usize].load(Ordering::Relaxed)
    }

    /// Reset this bucket in place to a new window, zeroing every counter.
    /// Callers must hold the array's reset lock before calling this.
    pub(crate) fn reset_to(&self, window_start: u64) {
        self.window_start.store(window_start, Ordering::Release);
        for c in &self.counters {
            c.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new(0)
    }
}
