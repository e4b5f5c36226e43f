//! Process-wide singletons: the slot chain and
//! node maps every resource shares, and the rule tables slots consult on
//! every call.
//!
//! Rules are published as whole per-resource snapshots behind `ArcSwap`,
//! the way upstream's rule managers work: a writer replaces the entire
//! map, readers always see a consistent snapshot with no locking on the
//! hot path. Built shaper/breaker objects are cached separately, keyed on
//! the `Arc` identity of the rule snapshot that produced them, so
//! republishing an unrelated resource's rules doesn't reset another
//! resource's in-flight shaper state.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cluster::TokenService;
use crate::degrade_checker::DegradeChecker;
use crate::node::ClusterNode;
use crate::node::DefaultNode;
use crate::node::EntranceNode;
use crate::param_metric::ParameterMetric;
use crate::rules::AuthorityRule;
use crate::rules::DegradeRule;
use crate::rules::FlowRule;
use crate::rules::ParamFlowRule;
use crate::rules::SystemRule;
use crate::shapers::build_flow_controller;
use crate::shapers::FlowController;

/// Per-resource rule snapshots behind `ArcSwap`, generic over the rule
/// payload type so one implementation serves flow/degrade/authority/
/// hot-parameter rules alike.
pub struct RuleManager<R> {
    rules: ArcSwap<HashMap<String, Arc<Vec<Arc<R>>>>>,
}

impl<R> RuleManager<R> {
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Replace the rule set for `resource`. An empty `rules` removes the
    /// resource's entry entirely.
    pub fn set(&self, resource: impl Into<String>, rules: Vec<R>) {
        let resource = resource.into();
        let mut next = (**self.rules.load()).clone();
        if rules.is_empty() {
            next.remove(&resource);
        } else {
            next.insert(resource, Arc::new(rules.into_iter().map(Arc::new).collect()));
        }
        self.rules.store(Arc::new(next));
    }

    /// Current snapshot for `resource`, or a shared empty list.
    pub fn get(&self, resource: &str) -> Arc<Vec<Arc<R>>> {
        self.rules.load().get(resource).cloned().unwrap_or_else(|| Arc::new(Vec::new()))
    }
}

impl<R> Default for RuleManager<R> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Registry {
    slot_chains: DashMap<String, Arc<crate::chain::SlotChain>>,
    default_nodes: DashMap<(String, String), Arc<DefaultNode>>,
    cluster_nodes: DashMap<String, Arc<ClusterNode>>,
    entrance_nodes: DashMap<String, Arc<EntranceNode>>,

    pub flow_rules: RuleManager<FlowRule>,
    pub degrade_rules: RuleManager<DegradeRule>,
    pub authority_rules: RuleManager<AuthorityRule>,
    pub param_flow_rules: RuleManager<ParamFlowRule>,
    pub system_rule: ArcSwap<SystemRule>,

    flow_controllers: DashMap<String, (Arc<Vec<Arc<FlowRule>>>, Arc<Vec<Arc<dyn FlowController>>>)>,
    degrade_checkers: DashMap<String, (Arc<Vec<Arc<DegradeRule>>>, Arc<Vec<Arc<DegradeChecker>>>)>,
    param_metrics: DashMap<String, Arc<Vec<Arc<ParameterMetric>>>>,

    /// Cluster-mode token-service client, consulted by hot-parameter rules
    /// whose `cluster_mode` is set. Rare to set and rare to read, so a plain
    /// mutex is fine here unlike the hot-path `ArcSwap` rule snapshots.
    token_service: Mutex<Option<Arc<dyn TokenService>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot_chains: DashMap::new(),
            default_nodes: DashMap::new(),
            cluster_nodes: DashMap::new(),
            entrance_nodes: DashMap::new(),
            flow_rules: RuleManager::new(),
            degrade_rules: RuleManager::new(),
            authority_rules: RuleManager::new(),
            param_flow_rules: RuleManager::new(),
            system_rule: ArcSwap::from_pointee(SystemRule::default()),
            flow_controllers: DashMap::new(),
            degrade_checkers: DashMap::new(),
            param_metrics: DashMap::new(),
            token_service: Mutex::new(None),
        })
    }

    /// Install (or clear, with `None`) the cluster-mode token-service
    /// client used by hot-parameter rules with `cluster_mode` set.
    pub fn set_token_service(&self, service: Option<Arc<dyn TokenService>>) {
        *self.token_service.lock() = service;
    }

    pub fn token_service(&self) -> Option<Arc<dyn TokenService>> {
        self.token_service.lock().clone()
    }

    pub fn slot_chain_for(self: &Arc<Self>, resource: &str) -> Arc<crate::chain::SlotChain> {
        if let Some(chain) = self.slot_chains.get(resource) {
            return chain.clone();
        }
        self.slot_chains
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(crate::chain::SlotChain::new(resource, self.clone())))
            .clone()
    }

    pub fn entrance_node_for(&self, context_name: &str) -> Arc<EntranceNode> {
        if let Some(node) = self.entrance_nodes.get(context_name) {
            return node.clone();
        }
        self.entrance_nodes
            .entry(context_name.to_string())
            .or_insert_with(|| Arc::new(EntranceNode::new()))
            .clone()
    }

    pub fn cluster_node_for(&self, resource: &str) -> Arc<ClusterNode> {
        if let Some(node) = self.cluster_nodes.get(resource) {
            return node.clone();
        }
        self.cluster_nodes
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(ClusterNode::new(resource)))
            .clone()
    }

    pub fn default_node_for(&self, context_name: &str, resource: &str, entrance_node: &Arc<EntranceNode>) -> Arc<DefaultNode> {
        let key = (context_name.to_string(), resource.to_string());
        if let Some(node) = self.default_nodes.get(&key) {
            return node.clone();
        }
        let cluster_node = self.cluster_node_for(resource);
        let node = self
            .default_nodes
            .entry(key)
            .or_insert_with(|| Arc::new(DefaultNode::new(resource, cluster_node)))
            .clone();
        entrance_node.add_child(node.clone());
        node
    }

    /// Flow controllers for `resource`, rebuilt only when the rule
    /// snapshot's `Arc` identity has changed since the last call.
    pub fn flow_controllers_for(&self, resource: &str) -> (Arc<Vec<Arc<FlowRule>>>, Arc<Vec<Arc<dyn FlowController>>>) {
        let rules = self.flow_rules.get(resource);
        if let Some(cached) = self.flow_controllers.get(resource) {
            if Arc::ptr_eq(&cached.0, &rules) {
                return cached.clone();
            }
        }
        let controllers: Vec<Arc<dyn FlowController>> = rules.iter().map(|r| Arc::from(build_flow_controller(r))).collect();
        let built = (rules, Arc::new(controllers));
        self.flow_controllers.insert(resource.to_string(), built.clone());
        built
    }

    /// Degrade checkers for `resource`, rebuilt only when the rule
    /// snapshot has changed. Republishing degrade rules for a resource
    /// resets that resource's breaker state.
    pub fn degrade_checkers_for(&self, resource: &str) -> Arc<Vec<Arc<DegradeChecker>>> {
        let rules = self.degrade_rules.get(resource);
        if let Some(cached) = self.degrade_checkers.get(resource) {
            if Arc::ptr_eq(&cached.0, &rules) {
                return cached.1.clone();
            }
        }
        let checkers: Vec<Arc<DegradeChecker>> = rules.iter().map(|r| Arc::new(DegradeChecker::new(r.clone()))).collect();
        let built = (rules, Arc::new(checkers));
        let result = built.1.clone();
        self.degrade_checkers.insert(resource.to_string(), built);
        result
    }

    /// Per-rule parameter-value counter tables for `resource`, growing (but
    /// never shrinking) to match the current rule count.
    pub fn param_metrics_for(&self, resource: &str, rule_count: usize) -> Arc<Vec<Arc<ParameterMetric>>> {
        if let Some(existing) = self.param_metrics.get(resource) {
            if existing.len() >= rule_count {
                return existing.clone();
            }
        }
        let mut entry = self
            .param_metrics
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(Vec::new()));
        if entry.len() < rule_count {
            let mut grown = (**entry).clone();
            while grown.len() < rule_count {
                grown.push(Arc::new(ParameterMetric::new()));
            }
            *entry = Arc::new(grown);
        }
        entry.clone()
    }
}
