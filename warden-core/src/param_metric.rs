//! Per-parameter-value traffic counters: each hot-parameter
//! rule tracks a bounded set of distinct argument values independently, so
//! a single abusive key can be throttled without affecting its neighbors.

use std::collections::VecDeque;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

/// A resolved hot-parameter value, coerced from whatever argument type the
/// caller passed in. `Collection` lets a single argument (e.g. a batch of
/// ids) be checked element-by-element against the same rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    I64(i64),
    Bool(bool),
    F64(f64),
    Collection(Vec<ParamValue>),
}

impl ParamValue {
    /// Flatten to the individual values a rule should be checked against:
    /// everything except `Collection` is a single value; `Collection`
    /// expands to each element.
    pub fn flatten(&self) -> Vec<&ParamValue> {
        match self {
            ParamValue::Collection(items) => items.iter().flat_map(|i| i.flatten()).collect(),
            other => vec![other],
        }
    }

    /// String form used as the counter map key and to match
    /// `ParamFlowRule::parsed_hot_items` overrides.
    pub fn cache_key(&self) -> String {
        match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::I64(i) => i.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::F64(f) => f.to_string(),
            ParamValue::Collection(_) => unreachable!("collections are flattened before keying"),
        }
    }
}

/// Sentinel meaning "this value has never been seen by the token bucket".
pub(crate) const UNFILLED: u64 = u64::MAX;
/// Sentinel meaning "no request has ever passed" for the virtual queue.
pub(crate) const NEVER_PASSED: i64 = i64::MIN;

/// Per-value counter state backing `ruleTokenCounters`/`ruleTimeCounters`/
/// `threadCountMap` for one hot-parameter rule. One instance per distinct
/// argument value the rule has seen.
#[derive(Debug)]
pub struct ParamCounter {
    /// Remaining tokens for the QPS/DEFAULT token bucket.
    pub(crate) tokens: AtomicI64,
    /// Last refill time (QPS/DEFAULT) in ms. `UNFILLED` until the value's
    /// first call.
    pub(crate) last_fill_ms: AtomicU64,
    /// Expected-pass time for the QPS/RATE_LIMITER virtual queue, in ms.
    /// `NEVER_PASSED` until the value's first call.
    pub(crate) last_pass_ms: AtomicI64,
    /// In-flight call count for the THREAD grade.
    pub(crate) thread_count: AtomicI64,
}

impl ParamCounter {
    fn new() -> Self {
        Self {
            tokens: AtomicI64::new(0),
            last_fill_ms: AtomicU64::new(UNFILLED),
            last_pass_ms: AtomicI64::new(NEVER_PASSED),
            thread_count: AtomicI64::new(0),
        }
    }

    pub fn thread_count(&self) -> i64 {
        self.thread_count.load(Ordering::Acquire)
    }

    pub(crate) fn release_thread(&self) {
        self.thread_count.fetch_sub(1, Ordering::AcqRel);
    }
}

const DEFAULT_CAPACITY: usize = 4096;

/// Bounded per-(resource, rule) table of [`ParamCounter`]s keyed by
/// parameter value, with FIFO eviction once the table grows past its
/// capacity — a long tail of one-off values must not pin memory forever.
#[derive(Debug)]
pub struct ParameterMetric {
    capacity: usize,
    counters: DashMap<String, Arc<ParamCounter>>,
    insertion_order: Mutex<VecDeque<String>>,
}

impl ParameterMetric {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            counters: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
        }
    }

    /// Get-or-create the counter for `key`, evicting the oldest entry first
    /// if the table is at capacity and `key` is new.
    pub fn counter_for(&self, key: &str) -> Arc<ParamCounter> {
        if let Some(counter) = self.counters.get(key) {
            return counter.clone();
        }

        let counter = Arc::new(ParamCounter::new());
        let inserted = match self.counters.entry(key.to_string()) {
            Entry::Occupied(existing) => return existing.get().clone(),
            Entry::Vacant(slot) => {
                slot.insert(counter.clone());
                true
            }
        };

        if inserted {
            let mut order = self.insertion_order.lock();
            order.push_back(key.to_string());
            if order.len() > self.capacity {
                if let Some(oldest) = order.pop_front() {
                    self.counters.remove(&oldest);
                }
            }
        }
        counter
    }

    /// The counter for `key` if it has already been touched, without
    /// creating one — used to release a thread-count guard on exit.
    pub fn existing(&self, key: &str) -> Option<Arc<ParamCounter>> {
        self.counters.get(key).map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl Default for ParameterMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_the_same_counter() {
        let metric = ParameterMetric::new();
        let a = metric.counter_for("user-1");
        let b = metric.counter_for("user-1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn eviction_drops_the_oldest_key_once_over_capacity() {
        let metric = ParameterMetric::with_capacity(2);
        metric.counter_for("a");
        metric.counter_for("b");
        metric.counter_for("c");
        assert_eq!(metric.len(), 2);
        assert!(metric.existing("a").is_none());
        assert!(metric.existing("c").is_some());
    }

    #[test]
    fn collection_flattens_to_its_elements() {
        let value = ParamValue::Collection(vec![ParamValue::I64(1), ParamValue::I64(2)]);
        let flat = value.flatten();
        assert_eq!(flat.len(), 2);
    }
}
