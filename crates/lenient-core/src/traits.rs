use crate::{NodeName, NodeRef, QueueItem, RunRef, UpstreamCause, WorkItemId};

/// Read-only view of the host's job queue.
///
/// Implementations take their own queue lock per call and return owned data;
/// the core never holds a lock across a graph walk.
pub trait JobQueue: Send + Sync {
    fn queued_items(&self) -> Vec<QueueItem>;

    /// Resolve the run an upstream cause points at; `None` once it was rotated away.
    fn upstream_run(&self, cause: &UpstreamCause) -> Option<RunRef>;

    fn is_buildable_as_placeholder(&self, item: &QueueItem) -> bool {
        item.is_placeholder()
    }

    /// Whether any online node other than `excluding` could take `item`.
    fn can_place_elsewhere(&self, item: &QueueItem, excluding: &NodeName) -> bool;
}

/// Read-only view of the host's worker nodes and their executors.
pub trait NodeRegistry: Send + Sync {
    fn nodes(&self) -> Vec<NodeRef>;

    fn node(&self, name: &NodeName) -> Option<NodeRef> {
        self.nodes().into_iter().find(|n| &n.name == name)
    }

    fn is_online(&self, name: &NodeName) -> bool {
        self.node(name).map(|n| n.online).unwrap_or(false)
    }

    /// Ids of the work-items currently executing on `name`, placeholder
    /// steps already resolved to their owning run.
    fn currently_running(&self, name: &NodeName) -> Vec<WorkItemId>;
}
