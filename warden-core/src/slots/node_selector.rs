//! NodeSelectorSlot: resolve the `DefaultNode` for
//! (context name, resource), creating and wiring it under the context's
//! shared `EntranceNode` on first use.

use std::sync::Arc;

use crate::node::DefaultNode;
use crate::node::EntranceNode;
use crate::registry::Registry;

pub fn select(registry: &Registry, context_name: &str, resource: &str, entrance_node: &Arc<EntranceNode>) -> Arc<DefaultNode> {
    registry.default_node_for(context_name, resource, entrance_node)
}
