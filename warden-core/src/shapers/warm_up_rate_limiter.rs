use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::node::StatisticNode;

use super::Admission;
use super::AtomicF64;
use super::FlowController;

/// Combines warm-up's adaptive threshold with rate-limiter queueing
///: the effective throughput ceiling climbs the way
/// [`super::WarmUpController`] computes it, but requests that exceed the
/// *current* ceiling are queued rather than dropped outright, the way
/// [`super::RateLimiterController`] queues them.
#[derive(Debug)]
pub struct WarmUpRateLimiterController {
    count: f64,
    cold_factor: f64,
    warning_token: f64,
    max_token: f64,
    slope: f64,
    max_queueing_time_ms: u64,
    stored_tokens: AtomicF64,
    last_filled_time_ms: AtomicI64,
    latest_passed_time_ms: AtomicI64,
}

const NEVER: i64 = i64::MIN;

impl WarmUpRateLimiterController {
    pub fn new(count: f64, warm_up_period_sec: u64, cold_factor: f64, max_queueing_time_ms: u64) -> Self {
        assert!(cold_factor > 1.0, "cold factor must be greater than 1");
        let warning_token = (warm_up_period_sec as f64 * count) / (cold_factor - 1.0);
        let max_token = warning_token + (2.0 * warm_up_period_sec as f64 * count) / (1.0 + cold_factor);
        let slope = (cold_factor - 1.0) / count / (max_token - warning_token);
        Self {
            count,
            cold_factor,
            warning_token,
            max_token,
            slope,
            max_queueing_time_ms,
            stored_tokens: AtomicF64::new(0.0),
            last_filled_time_ms: AtomicI64::new(0),
            latest_passed_time_ms: AtomicI64::new(NEVER),
        }
    }

    fn sync_token(&self, now_ms: u64, previous_pass_qps: f64) {
        let aligned = (now_ms - now_ms % 1000) as i64;
        let last = self.last_filled_time_ms.load(Ordering::Acquire);
        if aligned <= last {
            return;
        }

        let rest = self.stored_tokens.load();
        let refill_window_ms = (aligned - last) as f64;
        let refilled = if rest < self.warning_token {
            rest + refill_window_ms * self.count / 1000.0
        } else if previous_pass_qps < self.count / self.cold_factor {
            rest + refill_window_ms * self.count / 1000.0
        } else {
            rest
        };
        let new_value = (refilled.min(self.max_token) - previous_pass_qps).max(0.0);
        self.stored_tokens.store(new_value);
        self.last_filled_time_ms.store(aligned, Ordering::Release);
    }

    /// Current effective admit rate, the same curve `WarmUpController` uses
    /// to decide `warningQps` vs the flat `count`.
    fn effective_count(&self) -> f64 {
        let rest_tokens = self.stored_tokens.load();
        if rest_tokens >= self.warning_token {
            let above = rest_tokens - self.warning_token;
            1.0 / (above * self.slope + 1.0 / self.count)
        } else {
            self.count
        }
    }
}

impl FlowController for WarmUpRateLimiterController {
    fn can_pass(&self, node: &StatisticNode, now_ms: u64, acquire_count: u64, _prioritized: bool) -> Admission {
        let previous_pass_qps = node.previous_pass_qps(now_ms);
        self.sync_token(now_ms, previous_pass_qps);

        let effective_count = self.effective_count();
        if effective_count <= 0.0 {
            return Admission::Block;
        }

        let now = now_ms as i64;
        let cost = ((1000.0 * acquire_count as f64 / effective_count).round()) as i64;

        loop {
            let latest = self.latest_passed_time_ms.load(Ordering::Acquire);
            let expected = if latest == NEVER { now } else { latest + cost };

            if expected <= now {
                if self
                    .latest_passed_time_ms
                    .compare_exchange_weak(latest, now, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Admission::Admit;
                }
                continue;
            }

            let wait_ms = expected - now;
            if wait_ms as u64 > self.max_queueing_time_ms {
                return Admission::Block;
            }

            if self
                .latest_passed_time_ms
                .compare_exchange_weak(latest, expected, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Admission::AdmitAfter(Duration::from_millis(wait_ms as u64));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_when_cold_and_under_threshold() {
        let node = StatisticNode::new();
        let ctrl = WarmUpRateLimiterController::new(10.0, 10, 3.0, 2000);
        assert_eq!(ctrl.can_pass(&node, 0, 1, false), Admission::Admit);
    }

    #[test]
    fn queues_rather_than_drops_when_over_rate() {
        let node = StatisticNode::new();
        let ctrl = WarmUpRateLimiterController::new(5.0, 10, 3.0, 5000);
        let _ = ctrl.can_pass(&node, 0, 1, false);
        match ctrl.can_pass(&node, 0, 1, false) {
            Admission::Admit | Admission::AdmitAfter(_) => {}
            Admission::Block => panic!("expected queueing, not an outright block"),
        }
    }
}
