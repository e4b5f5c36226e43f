use std::sync::Arc;

use dashmap::DashMap;

use super::default_node::DefaultNode;

/// Aggregate of every [`DefaultNode`] entered directly within a single
/// `Context` name. One `EntranceNode` is shared globally per context name
///.
///
/// Unlike [`ClusterNode`](super::cluster_node::ClusterNode), this holds no
/// counters of its own: `pass_qps`/`block_qps`/etc. are computed by summing
/// over the registered children at query time
/// description of it as a read-only aggregation.
#[derive(Debug, Default)]
pub struct EntranceNode {
    children: DashMap<String, Arc<DefaultNode>>,
}

impl EntranceNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&self, node: Arc<DefaultNode>) {
        self.children.entry(node.resource().to_string()).or_insert(node);
    }

    pub fn children(&self) -> Vec<Arc<DefaultNode>> {
        self.children.iter().map(|e| e.value().clone()).collect()
    }

    pub fn pass_qps(&self, now_ms: u64) -> f64 {
        self.children.iter().map(|e| e.value().statistic().pass_qps(now_ms)).sum()
    }

    pub fn block_qps(&self, now_ms: u64) -> f64 {
        self.children.iter().map(|e| e.value().statistic().block_qps(now_ms)).sum()
    }

    pub fn total_qps(&self, now_ms: u64) -> f64 {
        self.pass_qps(now_ms) + self.block_qps(now_ms)
    }

    pub fn cur_thread_num(&self) -> i64 {
        self.children.iter().map(|e| e.value().statistic().cur_thread_num()).sum()
    }

    /// Weighted average RT across children, weighted by each child's
    /// success count so a low-traffic child doesn't skew the aggregate.
    pub fn avg_rt(&self, now_ms: u64) -> f64 {
        let (rt_sum, success_sum) = self.children.iter().fold((0.0, 0.0), |(rt, succ), e| {
            let stat = e.value().statistic();
            let s = stat.success_qps(now_ms);
            (rt + stat.avg_rt(now_ms) * s, succ + s)
        });
        if success_sum == 0.0 { 0.0 } else { rt_sum / success_sum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ClusterNode;

    #[test]
    fn aggregates_pass_across_children() {
        let entrance = EntranceNode::new();
        let cluster = Arc::new(ClusterNode::new("res"));
        let child_a = Arc::new(DefaultNode::new("a", cluster.clone()));
        let child_b = Arc::new(DefaultNode::new("b", cluster.clone()));
        child_a.statistic().add_pass(0, 5);
        child_b.statistic().add_pass(0, 7);
        entrance.add_child(child_a);
        entrance.add_child(child_b);
        assert!((entrance.pass_qps(0) - 12.0).abs() < 1e-9);
    }
}
