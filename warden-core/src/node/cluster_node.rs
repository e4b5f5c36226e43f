use std::sync::Arc;

use dashmap::DashMap;

use super::statistic_node::StatisticNode;

/// One per resource name, process-wide: the resource-level aggregate plus
/// a per-origin breakdown, attached by `ClusterBuilderSlot`.
///
/// The name is inherited from upstream Sentinel's `ClusterNode`; it has
/// nothing to do with this crate's `cluster` module (the token-server
/// abstraction) — it is the single aggregate node for a resource shared by
/// every `Context` that calls it, as distinct from the per-`(context,
/// resource)` [`DefaultNode`](super::default_node::DefaultNode).
#[derive(Debug)]
pub struct ClusterNode {
    resource: String,
    statistic: StatisticNode,
    origin_stats: DashMap<String, Arc<StatisticNode>>,
}

impl ClusterNode {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            statistic: StatisticNode::new(),
            origin_stats: DashMap::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn statistic(&self) -> &StatisticNode {
        &self.statistic
    }

    /// Fetch or lazily create the per-origin statistic node.
    pub fn origin_node(&self, origin: &str) -> Arc<StatisticNode> {
        if let Some(existing) = self.origin_stats.get(origin) {
            return existing.clone();
        }
        self.origin_stats
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(StatisticNode::new()))
            .clone()
    }
}
