use std::sync::Arc;

use dashmap::DashSet;

use super::cluster_node::ClusterNode;
use super::statistic_node::StatisticNode;

/// Per-resource-per-context node: the unit the slot chain actually reads
/// and writes on every call. Holds its own [`StatisticNode`], a reference
/// to the resource's process-wide [`ClusterNode`] (every write is mirrored
/// there), and the set of child nodes entered beneath it in the invocation
/// tree.
#[derive(Debug)]
pub struct DefaultNode {
    resource: String,
    statistic: StatisticNode,
    cluster_node: Arc<ClusterNode>,
    children: DashSet<String>,
}

impl DefaultNode {
    pub fn new(resource: impl Into<String>, cluster_node: Arc<ClusterNode>) -> Self {
        Self {
            resource: resource.into(),
            statistic: StatisticNode::new(),
            cluster_node,
            children: DashSet::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn statistic(&self) -> &StatisticNode {
        &self.statistic
    }

    pub fn cluster_node(&self) -> &Arc<ClusterNode> {
        &self.cluster_node
    }

    pub fn add_child(&self, child_resource: &str) {
        self.children.insert(child_resource.to_string());
    }

    pub fn children(&self) -> Vec<String> {
        self.children.iter().map(|e| e.clone()).collect()
    }
}
