//! The node family: leaf [`StatisticNode`] metric holders
//! composed into per-(context,resource) [`DefaultNode`]s, per-resource
//! [`ClusterNode`] aggregates, and per-context-name [`EntranceNode`]s.

mod cluster_node;
mod default_node;
mod entrance_node;
mod statistic_node;

pub use cluster_node::ClusterNode;
pub use default_node::DefaultNode;
pub use entrance_node::EntranceNode;
pub use statistic_node::StatisticNode;
