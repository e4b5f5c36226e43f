//! SystemSlot: process-wide overload protection, checked
//! ahead of any per-resource rule. Every threshold is opt-in.

use crate::error::BlockError;
use crate::node::EntranceNode;
use crate::rules::SystemRule;

/// Caller-supplied OS-level samples this crate does not collect itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSample {
    pub load: Option<f64>,
    pub cpu_usage: Option<f64>,
}

pub fn check(rule: &SystemRule, global: &EntranceNode, sample: SystemSample, now_ms: u64) -> Result<(), BlockError> {
    if let Some(max) = rule.max_load {
        if sample.load.is_some_and(|l| l > max) {
            return Err(BlockError::System { reason: "system load exceeded configured threshold" });
        }
    }
    if let Some(max) = rule.max_cpu_usage {
        if sample.cpu_usage.is_some_and(|c| c > max) {
            return Err(BlockError::System { reason: "cpu usage exceeded configured threshold" });
        }
    }
    if let Some(max) = rule.max_avg_rt_ms {
        if global.avg_rt(now_ms) > max {
            return Err(BlockError::System { reason: "average rt exceeded configured threshold" });
        }
    }
    if let Some(max) = rule.max_concurrency {
        if global.cur_thread_num() > max {
            return Err(BlockError::System { reason: "concurrency exceeded configured threshold" });
        }
    }
    if let Some(max) = rule.max_qps {
        if global.total_qps(now_ms) > max {
            return Err(BlockError::System { reason: "qps exceeded configured threshold" });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_every_threshold_is_unset() {
        let global = EntranceNode::new();
        let rule = SystemRule::default();
        assert!(check(&rule, &global, SystemSample::default(), 0).is_ok());
    }

    #[test]
    fn rejects_once_sampled_load_exceeds_threshold() {
        let global = EntranceNode::new();
        let rule = SystemRule {
            max_load: Some(1.0),
            ..Default::default()
        };
        let sample = SystemSample { load: Some(2.0), cpu_usage: None };
        assert!(check(&rule, &global, sample, 0).is_err());
    }
}
