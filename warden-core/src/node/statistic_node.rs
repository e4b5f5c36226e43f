use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use crate::metrics::MetricEvent;
use crate::metrics::MetricWindow;

/// One second-resolution window (2 buckets of 500ms) and one
/// minute-resolution window (60 buckets of 1000ms), plus a concurrent
/// in-flight counter. This is the leaf metric holder every [`Node`] variant
/// is built on.
///
/// [`Node`]: super::Node
#[derive(Debug)]
pub struct StatisticNode {
    second_window: MetricWindow,
    minute_window: MetricWindow,
    cur_thread_num: AtomicI64,
}

impl StatisticNode {
    pub fn new() -> Self {
        Self {
            second_window: MetricWindow::new(500, 2),
            minute_window: MetricWindow::new(1000, 60),
            cur_thread_num: AtomicI64::new(0),
        }
    }

    pub fn second_window(&self) -> &MetricWindow {
        &self.second_window
    }

    pub fn minute_window(&self) -> &MetricWindow {
        &self.minute_window
    }

    pub fn add_pass(&self, now_ms: u64, count: u64) {
        self.second_window.add(now_ms, MetricEvent::Pass, count);
        self.minute_window.add(now_ms, MetricEvent::Pass, count);
    }

    pub fn add_block(&self, now_ms: u64, count: u64) {
        self.second_window.add(now_ms, MetricEvent::Block, count);
        self.minute_window.add(now_ms, MetricEvent::Block, count);
    }

    pub fn add_exception(&self, now_ms: u64, count: u64) {
        self.second_window.add(now_ms, MetricEvent::Exception, count);
        self.minute_window.add(now_ms, MetricEvent::Exception, count);
    }

    pub fn add_success(&self, now_ms: u64, count: u64, rt_ms: u64) {
        self.second_window.add(now_ms, MetricEvent::Success, count);
        self.minute_window.add(now_ms, MetricEvent::Success, count);
        self.second_window.add(now_ms, MetricEvent::Rt, rt_ms * count);
        self.minute_window.add(now_ms, MetricEvent::Rt, rt_ms * count);
    }

    pub fn add_occupied_pass(&self, now_ms: u64, count: u64) {
        self.second_window.add(now_ms, MetricEvent::OccupiedPass, count);
        self.minute_window.add(now_ms, MetricEvent::OccupiedPass, count);
    }

    pub fn increase_thread_num(&self) {
        self.cur_thread_num.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrease_thread_num(&self) {
        self.cur_thread_num.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn cur_thread_num(&self) -> i64 {
        self.cur_thread_num.load(Ordering::Relaxed)
    }

    pub fn pass_qps(&self, now_ms: u64) -> f64 {
        self.second_window.pass_qps(now_ms)
    }

    pub fn block_qps(&self, now_ms: u64) -> f64 {
        self.second_window.block_qps(now_ms)
    }

    pub fn exception_qps(&self, now_ms: u64) -> f64 {
        self.second_window.exception_qps(now_ms)
    }

    pub fn success_qps(&self, now_ms: u64) -> f64 {
        self.second_window.success_qps(now_ms)
    }

    pub fn total_qps(&self, now_ms: u64) -> f64 {
        self.second_window.total_qps(now_ms)
    }

    /// Pass QPS of the single previous second-bucket, used by warm-up
    /// shaping to decide whether the token bucket should keep cooling down.
    pub fn previous_pass_qps(&self, now_ms: u64) -> f64 {
        self.second_window.previous_qps(MetricEvent::Pass, now_ms)
    }

    /// Average RT computed from the minute window, matching upstream's use
    /// of a longer horizon for circuit-breaker RT decisions.
    pub fn avg_rt(&self, now_ms: u64) -> f64 {
        self.minute_window.avg_rt(now_ms)
    }

    pub fn total_exception_minute(&self, now_ms: u64) -> u64 {
        self.minute_window.total_exception(now_ms)
    }

    pub fn occupied_pass_qps(&self, now_ms: u64) -> f64 {
        self.second_window.qps(MetricEvent::OccupiedPass, now_ms)
    }

    /// Estimate the earliest future second-window alignment in which
    /// `acquire_count` more requests would fit under `threshold`, given the
    /// current rolling pass+occupied-pass rate. Returns `None` when no
    /// near-future window can satisfy the request.
    pub fn try_occupy_next(&self, now_ms: u64, acquire_count: u64, threshold: f64) -> Option<u64> {
        let window_len = self.second_window.array().window_length_ms();
        let max_wait_ms = window_len * self.second_window.array().sample_count() as u64;

        let mut wait = 0u64;
        while wait < max_wait_ms {
            let future = now_ms + wait;
            let projected = self.second_window.pass_qps(future) + self.second_window.occupied_pass_qps(future);
            if projected + acquire_count as f64 <= threshold {
                return Some(wait);
            }
            wait += window_len;
        }
        None
    }
}

impl Default for StatisticNode {
    fn default() -> Self {
        Self::new()
    }
}
