//! Rule definitions consumed as plain configuration records.
//!
//! These are intentionally dumb data: no behavior lives here. They are
//! `serde`-round-trippable so an external loader (out of scope for this
//! crate) can publish them, and they are published into a [`RuleManager`]
//! which the matching slot consults on every call.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Shaping axis: throughput (QPS) or in-flight concurrency (THREAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Thread,
    Qps,
}

/// How a `FlowRule` selects which node's metrics to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStrategy {
    Direct,
    Relate,
    Chain,
}

/// Shaping algorithm used once a `FlowRule` has selected its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlBehavior {
    Default,
    WarmUp,
    RateLimiter,
    WarmUpRateLimiter,
}

/// Cluster-mode knobs carried by a rule when `cluster_mode` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identifies this rule to the token server.
    pub flow_id: u64,
    pub threshold_type: ThresholdType,
    pub fallback_to_local_when_fail: bool,
    /// Multiplier applied to the server-computed threshold to tolerate a
    /// short burst above it before blocking (1.0 = no added tolerance).
    pub exceed_count: f64,
}

impl ClusterConfig {
    pub fn new(flow_id: u64, threshold_type: ThresholdType) -> Self {
        Self {
            flow_id,
            threshold_type,
            fallback_to_local_when_fail: true,
            exceed_count: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdType {
    Global,
    AvgLocal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    pub resource: String,
    /// Origin selector: empty/`"default"` matches every caller.
    pub limit_app: String,
    pub grade: Grade,
    pub count: f64,
    pub strategy: FlowStrategy,
    pub control_behavior: ControlBehavior,
    /// Resource referenced by `Relate`/`Chain` strategies.
    pub ref_resource: Option<String>,
    pub warm_up_period_sec: u64,
    pub cold_factor: u32,
    pub max_queueing_time_ms: u64,
    pub cluster_mode: bool,
    pub cluster_config: Option<ClusterConfig>,
}

impl FlowRule {
    pub fn new(resource: impl Into<String>, grade: Grade, count: f64) -> Self {
        Self {
            resource: resource.into(),
            limit_app: "default".to_string(),
            grade,
            count,
            strategy: FlowStrategy::Direct,
            control_behavior: ControlBehavior::Default,
            ref_resource: None,
            warm_up_period_sec: 10,
            cold_factor: 3,
            max_queueing_time_ms: 500,
            cluster_mode: false,
            cluster_config: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradeGrade {
    Rt,
    ExRatio,
    ExCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradeRule {
    pub resource: String,
    pub limit_app: String,
    pub grade: DegradeGrade,
    /// RT threshold in ms, exception ratio in `[0,1]`, or raw exception count
    /// depending on `grade`.
    pub count: f64,
    pub time_window_sec: u64,
    pub rt_slow_request_amount: u32,
    pub min_request_amount: u32,
}

impl DegradeRule {
    pub fn new(resource: impl Into<String>, grade: DegradeGrade, count: f64, time_window_sec: u64) -> Self {
        Self {
            resource: resource.into(),
            limit_app: "default".to_string(),
            grade,
            count,
            time_window_sec,
            rt_slow_request_amount: 5,
            min_request_amount: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityStrategy {
    White,
    Black,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityRule {
    pub resource: String,
    pub strategy: AuthorityStrategy,
    /// Comma-separated list of origins.
    pub limit_app: String,
}

impl AuthorityRule {
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.limit_app.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamFlowRule {
    pub resource: String,
    pub param_idx: i32,
    pub grade: Grade,
    pub count: u64,
    pub control_behavior: ControlBehavior,
    pub duration_in_sec: u64,
    pub burst_count: u64,
    pub max_queueing_time_ms: u64,
    /// Per-value threshold overrides, keyed by the parameter's string form.
    pub parsed_hot_items: HashMap<String, u64>,
    pub cluster_mode: bool,
    pub cluster_config: Option<ClusterConfig>,
}

impl ParamFlowRule {
    pub fn new(resource: impl Into<String>, param_idx: i32, count: u64, duration_in_sec: u64) -> Self {
        Self {
            resource: resource.into(),
            param_idx,
            grade: Grade::Qps,
            count,
            control_behavior: ControlBehavior::Default,
            duration_in_sec,
            burst_count: 0,
            max_queueing_time_ms: 0,
            parsed_hot_items: HashMap::new(),
            cluster_mode: false,
            cluster_config: None,
        }
    }

    /// Resolve a possibly-negative index against an argument list length.
    /// Returns `None` ("illegal, rule becomes inert") if out of range.
    pub fn resolved_index(&self, args_len: usize) -> Option<usize> {
        if self.param_idx >= 0 {
            let idx = self.param_idx as usize;
            (idx < args_len).then_some(idx)
        } else {
            let idx = args_len as i64 + self.param_idx as i64;
            (idx >= 0 && (idx as usize) < args_len).then_some(idx as usize)
        }
    }
}

/// Process-wide overload protection, evaluated before per-resource rules.
/// Every threshold is off (`None`) by default; a caller
/// opts in per metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemRule {
    /// Reject new entries once the global average RT (ms, minute window)
    /// exceeds this.
    pub max_avg_rt_ms: Option<f64>,
    /// Reject new entries once global in-flight concurrency exceeds this.
    pub max_concurrency: Option<i64>,
    /// Reject new entries once global QPS exceeds this.
    pub max_qps: Option<f64>,
    /// Reject new entries once the process's 1-minute load average
    /// exceeds this (caller-supplied; this crate does no OS sampling).
    pub max_load: Option<f64>,
    /// Reject new entries once caller-supplied CPU usage (0.0-1.0)
    /// exceeds this.
    pub max_cpu_usage: Option<f64>,
}
