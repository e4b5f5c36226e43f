//! The slot chain: one [`SlotChain`] per resource,
//! shared process-wide, running a fixed ordered pipeline of checks around
//! every call and recording the outcome against the resource's nodes.
//!
//! There's no single "invoke the wrapped call" step here — `entry`/`exit`
//! are exposed as the two halves of that wrap, mirroring `Context`'s own
//! entry/exit stack — so the
//! statistic bookkeeping upstream calls `StatisticSlot` is split the same
//! way: admission counters at `entry`, completion counters at `exit`.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::context::Entry;
use crate::error::BlockError;
use crate::error::EntryType;
use crate::error::ErrorEntryFreeError;
use crate::param_metric::ParamValue;
use crate::registry::Registry;
use crate::slots;
use crate::slots::system::SystemSample;

pub struct SlotChain {
    resource: String,
    registry: Arc<Registry>,
}

impl SlotChain {
    pub(crate) fn new(resource: impl Into<String>, registry: Arc<Registry>) -> Self {
        Self {
            resource: resource.into(),
            registry,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Run the check pipeline and, on admission, push an [`Entry`] onto
    /// `ctx`. On rejection, no entry is pushed — callers must not call
    /// [`SlotChain::exit`] for a rejected call.
    ///
    /// Returns `Ok(None)` for immediate admission, `Ok(Some(wait))` when a
    /// shaper granted admission only after queueing, or `Err` for a
    /// rejection.
    #[allow(clippy::too_many_arguments)]
    pub fn entry(
        &self,
        ctx: &mut Context,
        entry_type: EntryType,
        count: u64,
        now_ms: u64,
        args: &[ParamValue],
        system_sample: SystemSample,
    ) -> Result<Option<Duration>, BlockError> {
        let default_node = slots::node_selector::select(&self.registry, &ctx.name, &self.resource, &ctx.entrance_node);
        let cluster_node = default_node.cluster_node().clone();
        let origin_node = slots::cluster_builder::origin_node(&cluster_node, &ctx.origin);

        if let Some(parent) = ctx.current_entry() {
            parent.current_node.add_child(&self.resource);
        }

        let result = self.check_all(ctx, count, now_ms, args, system_sample, &default_node);

        let (wait, degrade_probe, param_thread_guards) = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                default_node.statistic().add_block(now_ms, count);
                cluster_node.statistic().add_block(now_ms, count);
                if let Some(origin) = &origin_node {
                    origin.add_block(now_ms, count);
                }
                return Err(err);
            }
        };

        default_node.statistic().increase_thread_num();
        cluster_node.statistic().increase_thread_num();
        default_node.statistic().add_pass(now_ms, count);
        cluster_node.statistic().add_pass(now_ms, count);
        if let Some(origin) = &origin_node {
            origin.increase_thread_num();
            origin.add_pass(now_ms, count);
        }
        if wait.is_some() {
            default_node.statistic().add_occupied_pass(now_ms, count);
            cluster_node.statistic().add_occupied_pass(now_ms, count);
        }

        ctx.push_entry(Entry {
            resource: self.resource.clone(),
            entry_type,
            create_time_ms: now_ms,
            count,
            current_node: default_node,
            origin_node,
            error: None,
            traced_exception: false,
            admitted_after_wait: wait.is_some(),
            degrade_probe,
            param_thread_guards,
        });

        Ok(wait)
    }

    #[allow(clippy::type_complexity)]
    fn check_all(
        &self,
        ctx: &Context,
        count: u64,
        now_ms: u64,
        args: &[ParamValue],
        system_sample: SystemSample,
        default_node: &Arc<crate::node::DefaultNode>,
    ) -> Result<(Option<Duration>, Option<Arc<crate::degrade_checker::DegradeChecker>>, Vec<slots::param_flow::ThreadGuard>), BlockError> {
        let authority_rules = self.registry.authority_rules.get(&self.resource);
        slots::authority::check(&authority_rules, &ctx.origin)?;

        let system_rule = self.registry.system_rule.load();
        slots::system::check(&system_rule, &ctx.entrance_node, system_sample, now_ms)?;

        let degrade_checkers = self.registry.degrade_checkers_for(&self.resource);
        let degrade_probe = slots::degrade::check(&degrade_checkers, now_ms)?;

        let flow_wait = slots::flow::check(&self.registry, ctx, default_node, now_ms, count)?;

        let param_flow_rules = self.registry.param_flow_rules.get(&self.resource);
        let param_metrics = self.registry.param_metrics_for(&self.resource, param_flow_rules.len());
        let param_outcome = slots::param_flow::check(&self.registry, &param_flow_rules, &param_metrics, args, now_ms, count)?;

        let wait = match (flow_wait, param_outcome.wait) {
            (None, None) => None,
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (Some(a), Some(b)) => Some(a.max(b)),
        };

        Ok((wait, degrade_probe, param_outcome.thread_guards))
    }

    /// Pop the matching entry and record the call's outcome: success/rt or
    /// exception, against the same nodes `entry` admitted the call on.
    pub fn exit(&self, ctx: &mut Context, rt_ms: u64, success: bool, now_ms: u64) -> Result<(), ErrorEntryFreeError> {
        let entry = ctx.pop_matching(&self.resource)?;

        entry.current_node.statistic().decrease_thread_num();
        entry.current_node.cluster_node().statistic().decrease_thread_num();
        if let Some(origin) = &entry.origin_node {
            origin.decrease_thread_num();
        }

        if success {
            entry.current_node.statistic().add_success(now_ms, entry.count, rt_ms);
            entry.current_node.cluster_node().statistic().add_success(now_ms, entry.count, rt_ms);
            if let Some(origin) = &entry.origin_node {
                origin.add_success(now_ms, entry.count, rt_ms);
            }
        } else {
            entry.current_node.statistic().add_exception(now_ms, entry.count);
            entry.current_node.cluster_node().statistic().add_exception(now_ms, entry.count);
            if let Some(origin) = &entry.origin_node {
                origin.add_exception(now_ms, entry.count);
            }
        }

        if let Some(probe) = &entry.degrade_probe {
            probe.record_probe_result(success, now_ms);
        } else {
            for checker in self.registry.degrade_checkers_for(&self.resource).iter() {
                checker.check_and_trip(entry.current_node.cluster_node().statistic(), now_ms);
            }
        }

        Ok(())
    }
}
