//! Traffic shapers: `canPass(node, acquireCount, prioritized)
//! -> bool` in the upstream design, modeled here as a three-valued
//! [`Admission`] returned from every shaper instead of exception-as-control-
//! flow.

mod default_controller;
mod rate_limiter;
mod warm_up;
mod warm_up_rate_limiter;

pub use default_controller::DefaultController;
pub use rate_limiter::RateLimiterController;
pub use warm_up::WarmUpController;
pub use warm_up_rate_limiter::WarmUpRateLimiterController;

use std::time::Duration;

use crate::node::StatisticNode;
use crate::rules::ControlBehavior;
use crate::rules::FlowRule;

/// Outcome of asking a shaper whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Proceed immediately.
    Admit,
    /// Proceed, but only after sleeping for the given duration first
    /// ("priority wait" / leaky-bucket queueing).
    AdmitAfter(Duration),
    /// Reject outright.
    Block,
}

impl Admission {
    pub fn is_admit(&self) -> bool {
        !matches!(self, Admission::Block)
    }
}

/// Implemented by every shaping strategy. `threshold` is the rule's
/// configured `count`, already resolved by the caller (the `FlowSlot`
/// picks the node to read from; the controller only shapes against it).
pub trait FlowController: std::fmt::Debug + Send + Sync {
    fn can_pass(&self, node: &StatisticNode, now_ms: u64, acquire_count: u64, prioritized: bool) -> Admission;
}

/// Construct the shaper a `FlowRule` calls for, per its `control_behavior`.
pub fn build_flow_controller(rule: &FlowRule) -> Box<dyn FlowController> {
    match rule.control_behavior {
        ControlBehavior::Default => Box::new(DefaultController::new(rule.grade, rule.count, rule.max_queueing_time_ms)),
        ControlBehavior::RateLimiter => Box::new(RateLimiterController::new(rule.count, rule.max_queueing_time_ms)),
        ControlBehavior::WarmUp => Box::new(WarmUpController::new(rule.count, rule.warm_up_period_sec, rule.cold_factor as f64)),
        ControlBehavior::WarmUpRateLimiter => Box::new(WarmUpRateLimiterController::new(
            rule.count,
            rule.warm_up_period_sec,
            rule.cold_factor as f64,
            rule.max_queueing_time_ms,
        )),
    }
}

/// Minimal atomic f64 built on `AtomicU64`'s bit pattern, used by shapers
/// that need a CAS loop over a floating-point accumulator (warm-up's
/// stored-token count). Uses a CAS-with-retry style for
/// per-parameter token counters.
#[derive(Debug)]
pub(crate) struct AtomicF64(std::sync::atomic::AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(v: f64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(v.to_bits()))
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(std::sync::atomic::Ordering::Acquire))
    }

    pub(crate) fn store(&self, v: f64) {
        self.0.store(v.to_bits(), std::sync::atomic::Ordering::Release);
    }

    pub(crate) fn fetch_update(&self, mut f: impl FnMut(f64) -> f64) -> f64 {
        let mut cur = self.load();
        loop {
            let next = f(cur);
            match self.0.compare_exchange_weak(
                cur.to_bits(),
                next.to_bits(),
                std::sync::atomic::Ordering::AcqRel,
                std::sync::atomic::Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => cur = f64::from_bits(actual),
            }
        }
    }
}
