//! Shutdown lifecycle: scope flags, the permission registry they guard, and
//! the entry points the scheduler and the shutdown manager call.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashSet;
use tracing::info;

use crate::gate::{self, Admission};
use crate::permitted::{has_node_exclusive_item_in_queue, node_permitted_ids, permitted_queue_item_ids, running_everywhere};
use crate::{
    node_gate, ConfigError, JobQueue, NodeName, NodeRegistry, PermissionRegistry, QueueItem, ShutdownConfig,
    ShutdownScope, Verdict, WorkItemId,
};

#[derive(Default)]
pub struct ShutdownState {
    global: AtomicBool,
    draining: DashSet<NodeName>,
}

impl ShutdownState {
    pub fn is_global_active(&self) -> bool {
        self.global.load(Ordering::SeqCst)
    }

    pub fn is_node_draining(&self, node: &NodeName) -> bool {
        self.draining.contains(node)
    }

    pub fn is_active(&self, scope: &ShutdownScope) -> bool {
        match scope {
            ShutdownScope::Global => self.is_global_active(),
            ShutdownScope::Node(node) => self.is_node_draining(node),
        }
    }

    /// Raise or lower the global flag. Seeding the registry first is the
    /// caller's job; [`LenientShutdown`] does it.
    pub fn set_global(&self, active: bool) {
        self.global.store(active, Ordering::SeqCst);
    }

    /// Returns whether the node's draining flag changed.
    pub fn set_draining(&self, node: &NodeName, draining: bool) -> bool {
        if draining {
            self.draining.insert(node.clone())
        } else {
            self.draining.remove(node).is_some()
        }
    }

    pub fn draining_nodes(&self) -> Vec<NodeName> {
        let mut nodes: Vec<_> = self.draining.iter().map(|n| n.key().clone()).collect();
        nodes.sort();
        nodes
    }
}

/// Owns the per-episode state and hands the gates a consistent view of it.
pub struct LenientShutdown {
    state: ShutdownState,
    registry: PermissionRegistry,
    config: RwLock<Arc<ShutdownConfig>>,
    queue: Arc<dyn JobQueue>,
    nodes: Arc<dyn NodeRegistry>,
}

impl LenientShutdown {
    pub fn new(queue: Arc<dyn JobQueue>, nodes: Arc<dyn NodeRegistry>, config: ShutdownConfig) -> Self {
        Self {
            state: ShutdownState::default(),
            registry: PermissionRegistry::new(),
            config: RwLock::new(Arc::new(config)),
            queue,
            nodes,
        }
    }

    pub fn state(&self) -> &ShutdownState {
        &self.state
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn config(&self) -> Arc<ShutdownConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swaps in a new configuration; decisions already running keep the old one.
    pub fn set_config(&self, config: ShutdownConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        Ok(())
    }

    fn admission<'a>(&'a self, config: &'a ShutdownConfig) -> Admission<'a> {
        Admission {
            state: &self.state,
            registry: &self.registry,
            config,
            queue: self.queue.as_ref(),
            nodes: self.nodes.as_ref(),
        }
    }

    pub fn decide(&self, item: &QueueItem) -> Verdict {
        let config = self.config();
        gate::decide(&self.admission(&config), item)
    }

    pub fn decide_on_node(&self, item: &QueueItem, node: &NodeName) -> Verdict {
        let config = self.config();
        node_gate::decide_on_node(&self.admission(&config), item, node)
    }

    /// Starts a shutdown episode for `scope`. Work that is running, and queued
    /// work that already has the right to build, is recorded before the flag
    /// goes up so no gate sees the scope active with an unseeded registry.
    /// Starting an active scope does nothing.
    pub fn notify_shutdown_started(&self, scope: &ShutdownScope) {
        if self.state.is_active(scope) {
            return;
        }
        let config = self.config();
        match scope {
            ShutdownScope::Global => {
                self.registry.reset();
                let mut seeded = running_everywhere(self.nodes.as_ref());
                seeded.extend(permitted_queue_item_ids(self.queue.as_ref(), &config));
                for id in &seeded {
                    self.registry.record_active_chain(*id);
                }
                self.state.set_global(true);
                info!(seeded = seeded.len(), "lenient shutdown started");
            }
            ShutdownScope::Node(node) => {
                self.registry.forget_node(node);
                let mut seeded: BTreeSet<WorkItemId> = self.nodes.currently_running(node).into_iter().collect();
                seeded.extend(node_permitted_ids(self.queue.as_ref(), self.nodes.as_ref(), &config, node));
                for id in &seeded {
                    self.registry.permit_on_node(*id, node);
                }
                self.state.set_draining(node, true);
                info!(%node, seeded = seeded.len(), "lenient node shutdown started");
            }
        }
    }

    /// Ends the episode for `scope` and drops everything recorded under it.
    pub fn notify_shutdown_cancelled(&self, scope: &ShutdownScope) {
        match scope {
            ShutdownScope::Global => {
                self.state.set_global(false);
                self.registry.reset();
                info!("lenient shutdown cancelled");
            }
            ShutdownScope::Node(node) => {
                self.state.set_draining(node, false);
                self.registry.forget_node(node);
                info!(%node, "lenient node shutdown cancelled");
            }
        }
    }

    pub fn notify_node_deleted(&self, node: &NodeName) {
        let was_draining = self.state.set_draining(node, false);
        self.registry.forget_node(node);
        info!(%node, was_draining, "node deleted, dropped its shutdown state");
    }

    pub fn running_work_items(&self, node: &NodeName) -> BTreeSet<WorkItemId> {
        self.nodes.currently_running(node).into_iter().collect()
    }

    pub fn running_work_items_everywhere(&self) -> BTreeSet<WorkItemId> {
        running_everywhere(self.nodes.as_ref())
    }

    pub fn has_node_exclusive_item_in_queue(&self, node: &NodeName) -> bool {
        has_node_exclusive_item_in_queue(self.queue.as_ref(), node)
    }

    /// A draining node is safe to take offline once it runs nothing and no
    /// queued item depends on it alone.
    pub fn is_node_drained(&self, node: &NodeName) -> bool {
        self.nodes.currently_running(node).is_empty() && !self.has_node_exclusive_item_in_queue(node)
    }
}
