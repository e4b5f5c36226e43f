//! FlowSlot: evaluate every `FlowRule` configured for
//! a resource against the node its `FlowStrategy` selects.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Context;
use crate::error::BlockError;
use crate::node::DefaultNode;
use crate::registry::Registry;
use crate::rules::FlowRule;
use crate::rules::FlowStrategy;
use crate::shapers::Admission;
use crate::shapers::FlowController;

pub fn check(
    registry: &Registry,
    ctx: &Context,
    default_node: &Arc<DefaultNode>,
    now_ms: u64,
    acquire_count: u64,
) -> Result<Option<Duration>, BlockError> {
    let (rules, controllers) = registry.flow_controllers_for(default_node.resource());
    let mut max_wait: Option<Duration> = None;

    for (rule, controller) in rules.iter().zip(controllers.iter()) {
        if let Some(wait) = evaluate(registry, ctx, default_node, rule, controller.as_ref(), now_ms, acquire_count)? {
            max_wait = Some(max_wait.map_or(wait, |m| m.max(wait)));
        }
    }

    Ok(max_wait)
}

fn evaluate(
    registry: &Registry,
    ctx: &Context,
    default_node: &Arc<DefaultNode>,
    rule: &Arc<FlowRule>,
    controller: &dyn FlowController,
    now_ms: u64,
    acquire_count: u64,
) -> Result<Option<Duration>, BlockError> {
    if !(rule.limit_app == "default" || rule.limit_app == ctx.origin) {
        return Ok(None);
    }

    let cluster_node;
    let origin_node;
    let stat = match rule.strategy {
        FlowStrategy::Direct => {
            if rule.limit_app == "default" {
                default_node.cluster_node().statistic()
            } else {
                // `limit_app` matched this call's origin above: shape that
                // origin alone, not the resource's aggregate traffic.
                origin_node = default_node.cluster_node().origin_node(&ctx.origin);
                origin_node.as_ref()
            }
        }
        FlowStrategy::Relate => {
            let Some(ref_resource) = rule.ref_resource.as_deref() else {
                return Ok(None);
            };
            cluster_node = registry.cluster_node_for(ref_resource);
            cluster_node.statistic()
        }
        FlowStrategy::Chain => {
            if Some(ctx.name.as_str()) != rule.ref_resource.as_deref() {
                return Ok(None);
            }
            default_node.statistic()
        }
    };

    let prioritized = rule.max_queueing_time_ms > 0;
    match controller.can_pass(stat, now_ms, acquire_count, prioritized) {
        Admission::Admit => Ok(None),
        Admission::AdmitAfter(wait) => Ok(Some(wait)),
        Admission::Block => Err(BlockError::Flow { rule: rule.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::node::EntranceNode;
    use crate::registry::Registry;
    use crate::rules::Grade;

    #[test]
    fn direct_strategy_blocks_past_count() {
        let registry = Registry::new();
        registry.flow_rules.set("res", vec![FlowRule::new("res", Grade::Qps, 1.0)]);
        let entrance = Arc::new(EntranceNode::new());
        let default_node = registry.default_node_for("ctx", "res", &entrance);
        let ctx = Context::new("ctx", "default", entrance);

        assert!(check(&registry, &ctx, &default_node, 0, 1).unwrap().is_none());
        default_node.cluster_node().statistic().add_pass(0, 1);
        assert!(check(&registry, &ctx, &default_node, 0, 1).is_err());
    }

    #[test]
    fn direct_strategy_shares_the_cluster_node_across_contexts() {
        // A `limit_app=default` rule must cap the resource's total traffic,
        // not each calling context's traffic separately.
        let registry = Registry::new();
        registry.flow_rules.set("res", vec![FlowRule::new("res", Grade::Qps, 1.0)]);
        let entrance = Arc::new(EntranceNode::new());
        let node_a = registry.default_node_for("ctx-a", "res", &entrance);
        let node_b = registry.default_node_for("ctx-b", "res", &entrance);
        let ctx_a = Context::new("ctx-a", "default", entrance.clone());
        let ctx_b = Context::new("ctx-b", "default", entrance);

        assert!(check(&registry, &ctx_a, &node_a, 0, 1).unwrap().is_none());
        node_a.cluster_node().statistic().add_pass(0, 1);
        assert!(check(&registry, &ctx_b, &node_b, 0, 1).is_err());
    }

    #[test]
    fn direct_strategy_with_origin_shapes_only_that_origin() {
        let registry = Registry::new();
        let mut rule = FlowRule::new("res", Grade::Qps, 1.0);
        rule.limit_app = "caller-a".to_string();
        registry.flow_rules.set("res", vec![rule]);
        let entrance = Arc::new(EntranceNode::new());
        let default_node = registry.default_node_for("ctx", "res", &entrance);
        let ctx_a = Context::new("ctx", "caller-a", entrance.clone());
        let ctx_b = Context::new("ctx", "caller-b", entrance);

        assert!(check(&registry, &ctx_a, &default_node, 0, 1).unwrap().is_none());
        default_node.cluster_node().origin_node("caller-a").add_pass(0, 1);
        assert!(check(&registry, &ctx_a, &default_node, 0, 1).is_err());
        // A different origin is untouched by caller-a's traffic.
        assert!(check(&registry, &ctx_b, &default_node, 0, 1).unwrap().is_none());
    }

    #[test]
    fn chain_strategy_matches_on_context_name_not_parent_resource() {
        let registry = Registry::new();
        let mut rule = FlowRule::new("res", Grade::Qps, 1.0);
        rule.strategy = FlowStrategy::Chain;
        rule.ref_resource = Some("caller-chain".to_string());
        registry.flow_rules.set("res", vec![rule]);
        let entrance = Arc::new(EntranceNode::new());
        let default_node = registry.default_node_for("caller-chain", "res", &entrance);
        let other_node = registry.default_node_for("other-chain", "res", &entrance);
        let matching_ctx = Context::new("caller-chain", "default", entrance.clone());
        let other_ctx = Context::new("other-chain", "default", entrance);

        default_node.statistic().add_pass(0, 1);
        assert!(check(&registry, &matching_ctx, &default_node, 0, 1).is_err());
        // Same rule, different context name: the rule never applies here.
        other_node.statistic().add_pass(0, 1);
        assert!(check(&registry, &other_ctx, &other_node, 0, 1).unwrap().is_none());
    }
}
