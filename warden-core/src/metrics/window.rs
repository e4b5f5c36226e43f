//! Sliding-window metrics engine.
//!
//! `BucketArray` is a fixed-size ring of time-aligned [`Bucket`]s. Sizing it
//! once at construction time (rather than lazily installing buckets with a
//! CAS on first use, as the upstream design does) keeps the hot path free
//! of dynamic allocation, per the re-architecture hint.

use parking_lot::Mutex;

use super::bucket::Bucket;
use super::bucket::MetricEvent;

/// A fixed-size, time-aligned ring of counter buckets.
#[derive(Debug)]
pub struct BucketArray {
    window_length_ms: u64,
    sample_count: usize,
    interval_ms: u64,
    buckets: Vec<Bucket>,
    /// Guards only the rare bucket-reset transition; the hot read/write
    /// path never takes this lock.
    reset_lock: Mutex<()>,
}

impl BucketArray {
    pub fn new(window_length_ms: u64, sample_count: usize) -> Self {
        assert!(window_length_ms > 0, "window_length_ms must be positive");
        assert!(sample_count > 0, "sample_count must be positive");
        Self {
            window_length_ms,
            sample_count,
            interval_ms: window_length_ms * sample_count as u64,
            buckets: (0..sample_count).map(|_| Bucket::new(0)).collect(),
            reset_lock: Mutex::new(()),
        }
    }

    pub fn window_length_ms(&self) -> u64 {
        self.window_length_ms
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    fn aligned(&self, now_ms: u64) -> u64 {
        now_ms - now_ms % self.window_length_ms
    }

    fn index(&self, now_ms: u64) -> usize {
        ((now_ms / self.window_length_ms) as usize) % self.sample_count
    }

    /// Returns the current bucket for `now_ms`, resetting a stale one in
    /// place if needed. Clock regressions return a throwaway zeroed bucket
    /// rather than corrupting a live one.
    pub fn current_bucket(&self, now_ms: u64) -> CurrentBucket<'_> {
        let idx = self.index(now_ms);
        let aligned = self.aligned(now_ms);
        let bucket = &self.buckets[idx];
        let start = bucket.window_start();

        if start == aligned {
            return CurrentBucket::Live(bucket);
        }
        if start > aligned {
            // Clock regression: never touch a bucket with a later window.
            return CurrentBucket::Stale(Bucket::new(aligned));
        }

        // Stale: reset exactly once per new alignment under the narrow lock.
        let _guard = self.reset_lock.lock();
        // Re-check: another thread may have already rotated this bucket
        // while we were waiting for the lock.
        if bucket.window_start() != aligned {
            bucket.reset_to(aligned);
        }
        CurrentBucket::Live(bucket)
    }

    /// Sum `event` over every bucket still inside the rolling interval
    /// ending at `now_ms`.
    pub fn sum(&self, event: MetricEvent, now_ms: u64) -> u64 {
        let floor = now_ms.saturating_sub(self.interval_ms);
        self.buckets
            .iter()
            .filter(|b| b.window_start() > floor)
            .map(|b| b.get(event))
            .sum()
    }

    /// Sum `event` over only the buckets within the single most recent
    /// `window_length_ms` window (used for per-second QPS over the second
    /// array).
    pub fn sum_recent_window(&self, event: MetricEvent, now_ms: u64) -> u64 {
        self.sum(event, now_ms)
    }

    /// Value of the single bucket immediately preceding `now_ms`'s bucket,
    /// or 0 if that slot hasn't been written with that alignment (warm-up
    /// shaping needs last-bucket throughput, not the whole rolling sum).
    pub fn previous_bucket_sum(&self, event: MetricEvent, now_ms: u64) -> u64 {
        let prev_aligned = self.aligned(now_ms).saturating_sub(self.window_length_ms);
        let idx = self.index(prev_aligned);
        let bucket = &self.buckets[idx];
        if bucket.window_start() == prev_aligned {
            bucket.get(event)
        } else {
            0
        }
    }

    pub fn record(&self, now_ms: u64, event: MetricEvent, count: u64) {
        match self.current_bucket(now_ms) {
            CurrentBucket::Live(bucket) => bucket.add(event, count),
            CurrentBucket::Stale(_) => {
                // Clock regression: the sample is dropped rather than risk
                // corrupting a bucket with a later window start. Recovered
                // locally
                tracing::warn!("warden_core: dropped metric sample due to clock regression");
            }
        }
    }
}

pub enum CurrentBucket<'a> {
    Live(&'a Bucket),
    Stale(Bucket),
}

impl CurrentBucket<'_> {
    pub fn get(&self, event: MetricEvent) -> u64 {
        match self {
            CurrentBucket::Live(b) => b.get(event),
            CurrentBucket::Stale(b) => b.get(event),
        }
    }
}

/// Per-second/per-minute aggregate view built on top of a [`BucketArray`],
/// exposing the derived QPS/RT values `Node` reports.
#[derive(Debug)]
pub struct MetricWindow {
    array: BucketArray,
}

impl MetricWindow {
    pub fn new(window_length_ms: u64, sample_count: usize) -> Self {
        Self {
            array: BucketArray::new(window_length_ms, sample_count),
        }
    }

    pub fn array(&self) -> &BucketArray {
        &self.array
    }

    pub fn add(&self, now_ms: u64, event: MetricEvent, count: u64) {
        self.array.record(now_ms, event, count);
    }

    fn interval_sec(&self) -> f64 {
        self.array.interval_ms() as f64 / 1000.0
    }

    pub fn qps(&self, event: MetricEvent, now_ms: u64) -> f64 {
        self.array.sum(event, now_ms) as f64 / self.interval_sec()
    }

    pub fn pass_qps(&self, now_ms: u64) -> f64 {
        self.qps(MetricEvent::Pass, now_ms)
    }

    pub fn block_qps(&self, now_ms: u64) -> f64 {
        self.qps(MetricEvent::Block, now_ms)
    }

    pub fn exception_qps(&self, now_ms: u64) -> f64 {
        self.qps(MetricEvent::Exception, now_ms)
    }

    pub fn success_qps(&self, now_ms: u64) -> f64 {
        self.qps(MetricEvent::Success, now_ms)
    }

    pub fn total_qps(&self, now_ms: u64) -> f64 {
        self.pass_qps(now_ms) + self.block_qps(now_ms)
    }

    /// `sum(RT) / sum(SUCCESS)`, or 0 when nothing has completed.
    pub fn avg_rt(&self, now_ms: u64) -> f64 {
        let success = self.array.sum(MetricEvent::Success, now_ms);
        if success == 0 {
            0.0
        } else {
            self.array.sum(MetricEvent::Rt, now_ms) as f64 / success as f64
        }
    }

    pub fn total_exception(&self, now_ms: u64) -> u64 {
        self.array.sum(MetricEvent::Exception, now_ms)
    }

    pub fn total_success(&self, now_ms: u64) -> u64 {
        self.array.sum(MetricEvent::Success, now_ms)
    }

    pub fn total_pass(&self, now_ms: u64) -> u64 {
        self.array.sum(MetricEvent::Pass, now_ms)
    }

    pub fn total_occupied_pass(&self, now_ms: u64) -> u64 {
        self.array.sum(MetricEvent::OccupiedPass, now_ms)
    }

    /// QPS of `event` in the single bucket immediately preceding `now_ms`.
    pub fn previous_qps(&self, event: MetricEvent, now_ms: u64) -> f64 {
        self.array.previous_bucket_sum(event, now_ms) as f64 / (self.array.window_length_ms() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_bucket_is_aligned() {
        let arr = BucketArray::new(500, 2);
        let t = 1_234_567u64;
        let aligned = t - t % 500;
        let b = arr.current_bucket(t);
        assert_eq!(b.get(MetricEvent::Pass), 0);
        arr.record(t, MetricEvent::Pass, 1);
        let b2 = arr.current_bucket(t);
        assert_eq!(b2.get(MetricEvent::Pass), 1);
        // Same alignment bucket reused.
        let idx = (t / 500) as usize % 2;
        assert_eq!(arr.buckets[idx].window_start(), aligned);
    }

    #[test]
    fn stale_bucket_resets_exactly_once() {
        let arr = BucketArray::new(10, 2);
        arr.record(0, MetricEvent::Pass, 5);
        // Jump forward by exactly one full interval: same slot, later window.
        arr.record(20, MetricEvent::Pass, 1);
        let b = arr.current_bucket(20);
        assert_eq!(b.get(MetricEvent::Pass), 1, "stale bucket should have been zeroed");
    }

    #[test]
    fn clock_regression_yields_throwaway_bucket() {
        let arr = BucketArray::new(10, 2);
        arr.record(100, MetricEvent::Pass, 3);
        // Now query with an earlier timestamp than the bucket's window.
        let b = arr.current_bucket(0);
        assert_eq!(b.get(MetricEvent::Pass), 0);
        // The live bucket at 100 must be untouched.
        let live = arr.current_bucket(100);
        assert_eq!(live.get(MetricEvent::Pass), 3);
    }

    #[test]
    fn qps_divides_by_interval_seconds() {
        let window = MetricWindow::new(500, 2);
        window.add(0, MetricEvent::Pass, 10);
        // interval = 1000ms = 1s, so qps == raw sum while still inside window.
        assert!((window.pass_qps(0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn avg_rt_is_zero_without_success() {
        let window = MetricWindow::new(500, 2);
        assert_eq!(window.avg_rt(0), 0.0);
        window.add(0, MetricEvent::Success, 2);
        window.add(0, MetricEvent::Rt, 30);
        assert!((window.avg_rt(0) - 15.0).abs() < 1e-9);
    }
}
