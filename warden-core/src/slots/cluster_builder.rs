//! ClusterBuilderSlot: attach the resource's process-wide
//! `ClusterNode` and, when the call carries a known origin, that origin's
//! per-caller `StatisticNode`.

use std::sync::Arc;

use crate::node::ClusterNode;
use crate::node::StatisticNode;

pub fn origin_node(cluster_node: &Arc<ClusterNode>, origin: &str) -> Option<Arc<StatisticNode>> {
    if origin.is_empty() {
        None
    } else {
        Some(cluster_node.origin_node(origin))
    }
}
