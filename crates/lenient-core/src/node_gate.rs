//! Node admission gate, for draining one node while the cluster keeps running.
//!
//! Independent of the global gate: a candidate may be blocked on a draining
//! node and still be admitted globally, and the reverse.

use tracing::debug;

use crate::gate::Admission;
use crate::permitted::node_permitted_ids;
use crate::{BlockReason, NodeName, QueueItem, Verdict};

pub fn decide_on_node(ctx: &Admission<'_>, item: &QueueItem, node: &NodeName) -> Verdict {
    if !ctx.state.is_node_draining(node) {
        return Verdict::Allow;
    }
    // Node vanished from the registry mid-evaluation; treat as not draining.
    if ctx.nodes.node(node).is_none() {
        return Verdict::Allow;
    }

    let id = item.effective_id();
    if ctx.registry.is_permitted_on_node(id, node) {
        return Verdict::Allow;
    }

    if node_permitted_ids(ctx.queue, ctx.nodes, ctx.config, node).contains(&id) {
        ctx.registry.permit_on_node(id, node);
        debug!(job = %item.job, %id, %node, "allowing task on node even though node is shutting down");
        return Verdict::Allow;
    }

    debug!(job = %item.job, %id, %node, "preventing task from running on node, lenient shutdown active there");
    Verdict::Block(BlockReason::NodeShutdown { node: node.clone() })
}
