use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::NodeName;

/// Classification the global gate assigns to a work-item the first time it
/// is evaluated during a shutdown episode.
///
/// Everything except `Unclassified` is terminal for the life of the id.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionRecord {
    #[default]
    Unclassified,
    /// Root of a chain that was in flight (or admitted as new) at shutdown.
    ActiveChain,
    /// Admitted because its job, or an upstream chain, is allow-listed.
    AllowListedChain,
    /// Admitted because an upstream member was already permitted.
    UpstreamPermittedChain,
    Blocked,
}

impl PermissionRecord {
    pub fn is_classified(self) -> bool {
        !matches!(self, PermissionRecord::Unclassified)
    }

    pub fn is_permitted(self) -> bool {
        matches!(
            self,
            PermissionRecord::ActiveChain | PermissionRecord::AllowListedChain | PermissionRecord::UpstreamPermittedChain
        )
    }

    /// Whether downstream work of this item inherits its permission.
    /// Allow-listed chains propagate through their own rule instead.
    pub fn grants_upstream_permission(self) -> bool {
        matches!(self, PermissionRecord::ActiveChain | PermissionRecord::UpstreamPermittedChain)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownScope {
    Global,
    Node(NodeName),
}

impl fmt::Display for ShutdownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownScope::Global => f.write_str("global"),
            ShutdownScope::Node(node) => write!(f, "node {node}"),
        }
    }
}

/// Why a candidate was held back. An expected outcome, not an error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    GlobalShutdown { message: String },
    NodeShutdown { node: NodeName },
}

impl BlockReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            BlockReason::GlobalShutdown { .. } => "global_shutdown_blockage",
            BlockReason::NodeShutdown { .. } => "node_shutdown_blockage",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::GlobalShutdown { message } => write!(f, "Lenient shutdown is active: {message}"),
            BlockReason::NodeShutdown { node } => write!(f, "Node {node} is leniently shutting down"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Block(BlockReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn block_reason(&self) -> Option<&BlockReason> {
        match self {
            Verdict::Allow => None,
            Verdict::Block(reason) => Some(reason),
        }
    }
}
