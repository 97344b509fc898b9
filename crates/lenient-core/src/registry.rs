//! Permission state for one shutdown episode.
//!
//! Global classifications are first-write-wins per [`WorkItemId`]: the write
//! goes through the map's entry API, so two racing gates both observe the
//! same winner and nobody double-writes. Node permissions are keyed by node
//! so deleting a node drops its whole set in one step.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::{NodeName, PermissionRecord, WorkItemId};

#[derive(Default)]
pub struct PermissionRegistry {
    records: DashMap<WorkItemId, PermissionRecord>,
    node_permits: DashMap<NodeName, HashSet<WorkItemId>>,
    /// Ids classified `ActiveChain` or `UpstreamPermittedChain`.
    active_members: AtomicUsize,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_active_chain(&self, id: WorkItemId) -> PermissionRecord {
        self.record(id, PermissionRecord::ActiveChain)
    }

    pub fn record_allow_listed_chain(&self, id: WorkItemId) -> PermissionRecord {
        self.record(id, PermissionRecord::AllowListedChain)
    }

    pub fn record_upstream_permitted_chain(&self, id: WorkItemId) -> PermissionRecord {
        self.record(id, PermissionRecord::UpstreamPermittedChain)
    }

    pub fn record_blocked(&self, id: WorkItemId) -> PermissionRecord {
        self.record(id, PermissionRecord::Blocked)
    }

    /// Sets `class` for `id` unless it already has one. Returns the
    /// classification that is in effect afterwards, which is the earlier one
    /// when this call lost.
    pub fn record(&self, id: WorkItemId, class: PermissionRecord) -> PermissionRecord {
        if !class.is_classified() {
            return self.classify(id);
        }
        // Counted under the shard lock, so a reader that sees the record also
        // sees the count.
        *self.records.entry(id).or_insert_with(|| {
            if class.grants_upstream_permission() {
                self.active_members.fetch_add(1, Ordering::SeqCst);
            }
            class
        })
    }

    pub fn classify(&self, id: WorkItemId) -> PermissionRecord {
        self.records.get(&id).map(|r| *r).unwrap_or_default()
    }

    /// Whether any chain is currently admitted on its own merits.
    pub fn has_active_chains(&self) -> bool {
        self.active_members.load(Ordering::SeqCst) > 0
    }

    pub fn permit_on_node(&self, id: WorkItemId, node: &NodeName) -> bool {
        self.node_permits.entry(node.clone()).or_default().insert(id)
    }

    pub fn is_permitted_on_node(&self, id: WorkItemId, node: &NodeName) -> bool {
        self.node_permits.get(node).map(|ids| ids.contains(&id)).unwrap_or(false)
    }

    pub fn forget_node(&self, node: &NodeName) {
        self.node_permits.remove(node);
    }

    /// Drops every global classification.
    pub fn reset(&self) {
        self.records.clear();
        self.active_members.store(0, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn node_permit_count(&self, node: &NodeName) -> usize {
        self.node_permits.get(node).map(|ids| ids.len()).unwrap_or(0)
    }

    /// Sorted copy of the global table, for reporting.
    pub fn snapshot(&self) -> Vec<(WorkItemId, PermissionRecord)> {
        let mut rows: Vec<_> = self.records.iter().map(|r| (*r.key(), *r.value())).collect();
        rows.sort_by_key(|(id, _)| *id);
        rows
    }
}
