use lenient_core::{NodeName, WorkItemId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("unknown node {0}")]
    UnknownNode(NodeName),

    #[error("work-item {0} is not queued")]
    UnknownWorkItem(WorkItemId),

    #[error("no run for work-item {0}")]
    UnknownRun(WorkItemId),
}
