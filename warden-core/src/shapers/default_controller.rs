use std::time::Duration;

use crate::node::StatisticNode;
use crate::rules::Grade;

use super::Admission;
use super::FlowController;

/// Immediate-reject shaping: pass while `current +
/// acquireCount <= count`, otherwise either reject or, for a prioritized
/// QPS request, try to pre-occupy a future window and sleep into it.
#[derive(Debug)]
pub struct DefaultController {
    grade: Grade,
    count: f64,
    /// Occupying a future window is abandoned once the wait would exceed
    /// this — a prioritized caller that can't be served soon just blocks.
    occupy_timeout_ms: u64,
}

impl DefaultController {
    pub fn new(grade: Grade, count: f64, occupy_timeout_ms: u64) -> Self {
        Self { grade, count, occupy_timeout_ms }
    }
}

impl FlowController for DefaultController {
    fn can_pass(&self, node: &StatisticNode, now_ms: u64, acquire_count: u64, prioritized: bool) -> Admission {
        let current = match self.grade {
            Grade::Qps => node.pass_qps(now_ms),
            Grade::Thread => node.cur_thread_num() as f64,
        };

        if current + acquire_count as f64 <= self.count {
            return Admission::Admit;
        }

        if prioritized && self.grade == Grade::Qps {
            if let Some(wait_ms) = node.try_occupy_next(now_ms, acquire_count, self.count) {
                if wait_ms < self.occupy_timeout_ms {
                    // Recording the occupied pass is the caller's job (the
                    // chain's statistic bookkeeping), not this shaper's —
                    // it must land on whichever node the chain considers
                    // canonical for this resource, not necessarily `node`.
                    return Admission::AdmitAfter(Duration::from_millis(wait_ms));
                }
            }
        }

        Admission::Block
    }
}
