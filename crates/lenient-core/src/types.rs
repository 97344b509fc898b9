use serde::{Deserialize, Serialize};

use crate::ids::*;

/// Reference from a triggered work-item to the run that triggered it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UpstreamCause {
    pub job: JobName,
    pub build: u64,
}

/// One entry of a work-item's trigger metadata.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    Upstream(UpstreamCause),
    /// A human explicitly requested this run (including rebuilds).
    User { user_id: String },
    Other { description: String },
}

/// What kind of triggerable task a queue entry holds, resolved once by the host.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Project,
    Workflow,
    /// Step of an already-running execution. `owner` is the owning run's id,
    /// or `None` once that run can no longer be resolved.
    Placeholder { owner: Option<WorkItemId> },
    /// Anything that is neither a job nor a placeholder.
    Foreign,
}

/// Queue entry as read from the host. The core copies what it needs out of
/// it per call and never keeps it.
///
/// For placeholders `causes` carries the owning run's causes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItem {
    pub id: WorkItemId,
    pub job: JobName,
    pub kind: TaskKind,
    #[serde(default)]
    pub causes: Vec<Cause>,
    /// Placement constraint; `None` runs anywhere.
    #[serde(default)]
    pub label: Option<String>,
}

/// A started (or finished) run still resolvable by the host.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRef {
    /// Id of the work-item this run was started from.
    pub id: WorkItemId,
    pub job: JobName,
    pub build: u64,
    pub building: bool,
    #[serde(default)]
    pub causes: Vec<Cause>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRef {
    pub name: NodeName,
    pub online: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Closed classification of a queue entry, taken once at the gate boundary
/// so the decision logic never inspects task kinds again.
///
/// Whether an entry is a step of a running execution is the host's call
/// ([`crate::JobQueue::is_buildable_as_placeholder`]); an entry the host
/// rejects as a step is judged like any other job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Candidate<'a> {
    InFlightStep { owner: Option<WorkItemId> },
    Job { id: WorkItemId, job: &'a JobName, causes: &'a [Cause] },
    Foreign { id: WorkItemId },
}

impl<'a> Candidate<'a> {
    pub fn of(item: &'a QueueItem, buildable_as_placeholder: bool) -> Self {
        if buildable_as_placeholder {
            let owner = match item.kind {
                TaskKind::Placeholder { owner } => owner,
                _ => None,
            };
            return Candidate::InFlightStep { owner };
        }
        match item.kind {
            TaskKind::Foreign => Candidate::Foreign { id: item.id },
            _ => Candidate::Job { id: item.id, job: &item.job, causes: &item.causes },
        }
    }
}

impl QueueItem {
    /// Id that stands for this entry in permission bookkeeping: the owning
    /// run's id for placeholders whose run still resolves, the entry's own id
    /// otherwise.
    pub fn effective_id(&self) -> WorkItemId {
        match self.kind {
            TaskKind::Placeholder { owner: Some(owner) } => owner,
            _ => self.id,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, TaskKind::Placeholder { .. })
    }

    pub fn is_job_like(&self) -> bool {
        !matches!(self.kind, TaskKind::Foreign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: TaskKind) -> QueueItem {
        QueueItem { id: WorkItemId(5), job: JobName::from("app/build"), kind, causes: vec![], label: None }
    }

    #[test]
    fn placeholder_resolves_to_owner() {
        let step = item(TaskKind::Placeholder { owner: Some(WorkItemId(2)) });
        assert_eq!(step.effective_id(), WorkItemId(2));
        assert!(matches!(Candidate::of(&step, true), Candidate::InFlightStep { owner: Some(WorkItemId(2)) }));

        let orphan = item(TaskKind::Placeholder { owner: None });
        assert_eq!(orphan.effective_id(), WorkItemId(5));
    }

    #[test]
    fn placeholder_the_host_rejects_is_a_job() {
        let orphan = item(TaskKind::Placeholder { owner: None });
        assert!(matches!(Candidate::of(&orphan, false), Candidate::Job { id: WorkItemId(5), .. }));
    }

    #[test]
    fn jobs_keep_their_own_id() {
        for kind in [TaskKind::Project, TaskKind::Workflow] {
            let job = item(kind);
            assert_eq!(job.effective_id(), WorkItemId(5));
            assert!(matches!(Candidate::of(&job, false), Candidate::Job { id: WorkItemId(5), .. }));
        }
        assert!(matches!(Candidate::of(&item(TaskKind::Foreign), false), Candidate::Foreign { .. }));
    }
}
