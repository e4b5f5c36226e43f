use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use crate::node::StatisticNode;

use super::Admission;
use super::AtomicF64;
use super::FlowController;

/// Cold-start token bucket: throughput is allowed to climb
/// to `count` only gradually after a quiet period, the way a cache or
/// connection pool needs to warm back up before taking full load.
#[derive(Debug)]
pub struct WarmUpController {
    count: f64,
    cold_factor: f64,
    warning_token: f64,
    max_token: f64,
    slope: f64,
    stored_tokens: AtomicF64,
    last_filled_time_ms: AtomicI64,
}

impl WarmUpController {
    pub fn new(count: f64, warm_up_period_sec: u64, cold_factor: f64) -> Self {
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
            stored_tokens: AtomicF64::new(0.0),
            last_filled_time_ms: AtomicI64::new(0),
        }
    }

    /// Refill (or keep cooling down) the stored-token bucket once per
    /// second of wall-clock time, mirroring upstream's per-second sync.
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
        let new_value = refilled.min(self.max_token);

        self.stored_tokens.store(new_value);
        let after_consume = (new_value - previous_pass_qps).max(0.0);
        self.stored_tokens.store(after_consume);
        self.last_filled_time_ms.store(aligned, Ordering::Release);
    }
}

impl FlowController for WarmUpController {
    fn can_pass(&self, node: &StatisticNode, now_ms: u64, acquire_count: u64, _prioritized: bool) -> Admission {
        let pass_qps = node.pass_qps(now_ms);
        let previous_pass_qps = node.previous_pass_qps(now_ms);
        self.sync_token(now_ms, previous_pass_qps);

        let rest_tokens = self.stored_tokens.load();
        let admit = if rest_tokens >= self.warning_token {
            let above = rest_tokens - self.warning_token;
            let warning_qps = 1.0 / (above * self.slope + 1.0 / self.count);
            pass_qps + acquire_count as f64 <= warning_qps
        } else {
            pass_qps + acquire_count as f64 <= self.count
        };

        if admit { Admission::Admit } else { Admission::Block }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_below_count_when_cold() {
        let node = StatisticNode::new();
        let ctrl = WarmUpController::new(10.0, 10, 3.0);
        assert_eq!(ctrl.can_pass(&node, 0, 1, false), Admission::Admit);
    }

    #[test]
    fn warning_token_threshold_is_between_zero_and_max() {
        let ctrl = WarmUpController::new(10.0, 10, 3.0);
        assert!(ctrl.warning_token > 0.0);
        assert!(ctrl.max_token > ctrl.warning_token);
    }

    #[test]
    fn rejects_once_above_configured_count() {
        let node = StatisticNode::new();
        let ctrl = WarmUpController::new(5.0, 10, 3.0);
        node.add_pass(0, 100);
        assert_eq!(ctrl.can_pass(&node, 0, 1, false), Admission::Block);
    }
}
