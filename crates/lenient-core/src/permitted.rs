//! Queue-wide views of which queued work may still build during a shutdown.
//!
//! Each call takes one pass over the host queue; nothing is cached.

use std::collections::BTreeSet;

use crate::causation::{any_upstream_settled, CausationGraph};
use crate::{JobQueue, NodeName, NodeRegistry, ShutdownConfig, WorkItemId};

/// Ids of queued items that keep their right to build once shutdown starts.
///
/// - foreign task kinds are always included;
/// - with `allow_all_queued_items` every job is included;
/// - otherwise a job is included when an upstream run has completed, or when
///   it has any upstream run and `allow_all_downstream_items` is set.
///
/// Placeholder steps are reported under their owning run's id.
pub fn permitted_queue_item_ids(queue: &dyn JobQueue, config: &ShutdownConfig) -> BTreeSet<WorkItemId> {
    let graph = CausationGraph::new(queue);
    queue
        .queued_items()
        .into_iter()
        .filter(|item| {
            if !item.is_job_like() || config.allow_all_queued_items {
                return true;
            }
            let upstream = graph.upstream_runs(&item.causes);
            any_upstream_settled(&upstream, config.allow_all_downstream_items)
        })
        .map(|item| item.effective_id())
        .collect()
}

/// Permitted ids restricted to items only `node` can run. Empty when the node
/// is unknown to the registry.
pub fn node_permitted_ids(
    queue: &dyn JobQueue,
    nodes: &dyn NodeRegistry,
    config: &ShutdownConfig,
    node: &NodeName,
) -> BTreeSet<WorkItemId> {
    if nodes.node(node).is_none() {
        return BTreeSet::new();
    }
    let permitted = permitted_queue_item_ids(queue, config);
    queue
        .queued_items()
        .into_iter()
        .filter(|item| permitted.contains(&item.effective_id()) && !queue.can_place_elsewhere(item, node))
        .map(|item| item.effective_id())
        .collect()
}

/// Whether some queued item can only run on `node`.
pub fn has_node_exclusive_item_in_queue(queue: &dyn JobQueue, node: &NodeName) -> bool {
    queue.queued_items().iter().any(|item| !queue.can_place_elsewhere(item, node))
}

pub fn running_everywhere(nodes: &dyn NodeRegistry) -> BTreeSet<WorkItemId> {
    nodes.nodes().iter().flat_map(|node| nodes.currently_running(&node.name)).collect()
}
