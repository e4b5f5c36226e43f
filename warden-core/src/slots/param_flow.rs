//! ParamFlowSlot: shape per-(resource, parameter
//! value) throughput independently, using the rule's `parsed_hot_items`
//! override when the triggering value has one. The decision is
//! self-contained: each grade/control-behavior combination decrements its
//! own per-value counters as part of the admission check, rather than
//! reading a metric some other slot is responsible for updating.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster;
use crate::cluster::ClusterOutcome;
use crate::cluster::ParamTokenRequest;
use crate::error::BlockError;
use crate::param_metric::ParamCounter;
use crate::param_metric::ParamValue;
use crate::param_metric::ParameterMetric;
use crate::param_metric::NEVER_PASSED;
use crate::param_metric::UNFILLED;
use crate::registry::Registry;
use crate::rules::ControlBehavior;
use crate::rules::Grade;
use crate::rules::ParamFlowRule;

/// A thread-count increment taken by the THREAD grade, released when the
/// call it admitted exits. Dropping it without ever handing it to the
/// owning [`crate::context::Entry`] (e.g. because a later value in the same
/// call rejected) releases the count immediately, rolling it back.
pub struct ThreadGuard {
    counter: Arc<ParamCounter>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.counter.release_thread();
    }
}

/// Result of running every configured `ParamFlowRule` for one call.
pub struct ParamFlowOutcome {
    pub wait: Option<Duration>,
    pub thread_guards: Vec<ThreadGuard>,
}

pub fn check(
    registry: &Registry,
    rules: &[Arc<ParamFlowRule>],
    metrics: &[Arc<ParameterMetric>],
    args: &[ParamValue],
    now_ms: u64,
    acquire_count: u64,
) -> Result<ParamFlowOutcome, BlockError> {
    let mut max_wait: Option<Duration> = None;
    let mut guards: Vec<ThreadGuard> = Vec::new();

    for (rule, metric) in rules.iter().zip(metrics.iter()) {
        let Some(idx) = rule.resolved_index(args.len()) else {
            continue;
        };

        for value in args[idx].flatten() {
            let key = value.cache_key();
            let threshold = rule.parsed_hot_items.get(&key).copied().unwrap_or(rule.count);
            let counter = metric.counter_for(&key);

            match rule.grade {
                Grade::Thread => {
                    let acquired = counter.thread_count.fetch_add(1, Ordering::AcqRel) + 1;
                    if acquired as u64 > threshold {
                        counter.release_thread();
                        return Err(BlockError::ParamFlow { rule: rule.clone(), triggered_value: key });
                    }
                    guards.push(ThreadGuard { counter });
                }
                Grade::Qps => {
                    let local_decision = || match rule.control_behavior {
                        ControlBehavior::RateLimiter => {
                            match try_rate_limiter(&counter, now_ms, acquire_count, threshold, rule.duration_in_sec, rule.max_queueing_time_ms) {
                                Some(wait_ms) => ClusterOutcome::PassAfter(Duration::from_millis(wait_ms)),
                                None => ClusterOutcome::Block,
                            }
                        }
                        _ => {
                            if try_default(&counter, now_ms, acquire_count, threshold, rule.burst_count, rule.duration_in_sec) {
                                ClusterOutcome::Pass
                            } else {
                                ClusterOutcome::Block
                            }
                        }
                    };

                    let outcome = match (rule.cluster_mode, rule.cluster_config.as_ref(), registry.token_service()) {
                        (true, Some(cluster_config), Some(service)) => {
                            let resp = service.request_param(ParamTokenRequest {
                                flow_id: cluster_config.flow_id,
                                value_key: key.clone(),
                                acquire_count,
                                prioritized: rule.max_queueing_time_ms > 0,
                                now_ms,
                            });
                            cluster::apply_response(&resp, cluster_config.fallback_to_local_when_fail, local_decision)
                        }
                        _ => local_decision(),
                    };

                    match outcome {
                        ClusterOutcome::Pass => {}
                        ClusterOutcome::PassAfter(wait) => {
                            if !wait.is_zero() {
                                max_wait = Some(max_wait.map_or(wait, |m| m.max(wait)));
                            }
                        }
                        ClusterOutcome::Block => {
                            return Err(BlockError::ParamFlow { rule: rule.clone(), triggered_value: key });
                        }
                    }
                }
            }
        }
    }

    Ok(ParamFlowOutcome { wait: max_wait, thread_guards: guards })
}

/// QPS/DEFAULT token bucket: `maxCount = tokenCount + burstCount`, refilled
/// proportionally to elapsed time once a full `durationInSec` window has
/// passed since the last refill.
fn try_default(counter: &ParamCounter, now_ms: u64, acquire_count: u64, token_count: u64, burst_count: u64, duration_in_sec: u64) -> bool {
    let max_count = token_count.saturating_add(burst_count);
    if acquire_count > max_count {
        return false;
    }

    loop {
        let last_fill = counter.last_fill_ms.load(Ordering::Acquire);
        if last_fill == UNFILLED {
            match counter.last_fill_ms.compare_exchange_weak(UNFILLED, now_ms, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    counter.tokens.store(max_count as i64 - acquire_count as i64, Ordering::Release);
                    return true;
                }
                Err(_) => continue, // another caller just initialized this value; retry as a normal refill
            }
        }

        let duration_ms = duration_in_sec.saturating_mul(1000);
        let pass_time = now_ms.saturating_sub(last_fill);
        let current_tokens = counter.tokens.load(Ordering::Acquire);
        let available = if duration_ms > 0 && pass_time > duration_ms {
            let refilled = current_tokens as f64 + pass_time as f64 * token_count as f64 / duration_ms as f64;
            refilled.min(max_count as f64) as i64
        } else {
            current_tokens
        };

        let remaining = available - acquire_count as i64;
        if remaining < 0 {
            return false;
        }

        if counter.tokens.compare_exchange_weak(current_tokens, remaining, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            if available != current_tokens {
                counter.last_fill_ms.store(now_ms, Ordering::Release);
            }
            return true;
        }
        // Lost the race against a concurrent caller checking the same value: retry.
    }
}

/// QPS/RATE_LIMITER virtual queue: admit now if the expected-pass time is
/// already due or the resulting queueing delay stays under
/// `max_queueing_time_ms`, otherwise reject.
fn try_rate_limiter(
    counter: &ParamCounter,
    now_ms: u64,
    acquire_count: u64,
    token_count: u64,
    duration_in_sec: u64,
    max_queueing_time_ms: u64,
) -> Option<u64> {
    if token_count == 0 {
        return None;
    }
    let cost_ms = (1000.0 * acquire_count as f64 * duration_in_sec as f64 / token_count as f64).round() as i64;
    let now = now_ms as i64;

    loop {
        let last_pass = counter.last_pass_ms.load(Ordering::Acquire);
        let expected = if last_pass == NEVER_PASSED { now } else { last_pass + cost_ms };

        if expected <= now || (expected - now) < max_queueing_time_ms as i64 {
            if counter.last_pass_ms.compare_exchange_weak(last_pass, now, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return Some((expected - now).max(0) as u64);
            }
            continue;
        }

        return None;
    }
}
