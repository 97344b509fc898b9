use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use lenient_core::{
    Cause, JobName, JobQueue, NodeName, NodeRef, NodeRegistry, QueueItem, RunRef, TaskKind, UpstreamCause, WorkItemId,
};

use crate::error::ClusterError;

/// In-memory queue and node registry. Not durable; used by tests, scenario
/// replay and the CLI.
#[derive(Default)]
pub struct InMemoryCluster {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct Inner {
    queue: BTreeMap<WorkItemId, QueueItem>,
    runs: HashMap<UpstreamKey, RunRef>,
    runs_by_id: HashMap<WorkItemId, UpstreamKey>,
    next_build: HashMap<JobName, u64>,
    nodes: BTreeMap<NodeName, NodeState>,
}

type UpstreamKey = (JobName, u64);

struct NodeState {
    node: NodeRef,
    running: Vec<WorkItemId>,
}

/// Point-in-time copy of the whole cluster, for reporting.
#[derive(Clone, Debug, Serialize)]
pub struct ClusterSnapshot {
    pub queue: Vec<QueueItem>,
    pub runs: Vec<RunRef>,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeSnapshot {
    pub node: NodeRef,
    pub running: Vec<WorkItemId>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands out the next work-item id; ids start at 1 and never repeat.
    pub fn issue_id(&self) -> WorkItemId {
        WorkItemId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn add_node(&self, name: impl Into<NodeName>, labels: &[&str]) {
        let name = name.into();
        let node = NodeRef { name: name.clone(), online: true, labels: labels.iter().map(|l| l.to_string()).collect() };
        self.lock().nodes.insert(name, NodeState { node, running: Vec::new() });
    }

    pub fn set_online(&self, name: &NodeName, online: bool) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        let state = inner.nodes.get_mut(name).ok_or_else(|| ClusterError::UnknownNode(name.clone()))?;
        state.node.online = online;
        Ok(())
    }

    /// Removes a node. Whatever ran there is treated as finished.
    pub fn remove_node(&self, name: &NodeName) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        let state = inner.nodes.remove(name).ok_or_else(|| ClusterError::UnknownNode(name.clone()))?;
        for id in state.running {
            inner.finish_run(id);
        }
        Ok(())
    }

    pub fn enqueue(&self, job: impl Into<JobName>, kind: TaskKind, causes: Vec<Cause>, label: Option<&str>) -> WorkItemId {
        let id = self.issue_id();
        let item = QueueItem { id, job: job.into(), kind, causes, label: label.map(str::to_string) };
        self.lock().queue.insert(id, item);
        id
    }

    pub fn enqueue_project(&self, job: impl Into<JobName>, causes: Vec<Cause>) -> WorkItemId {
        self.enqueue(job, TaskKind::Project, causes, None)
    }

    /// Queues a step of the running execution `owner`. The step carries the
    /// owner's causes, like the host would report them.
    pub fn enqueue_step(&self, owner: WorkItemId, label: Option<&str>) -> Result<WorkItemId, ClusterError> {
        let (job, causes) = {
            let inner = self.lock();
            let run = inner.run(owner).ok_or(ClusterError::UnknownRun(owner))?;
            (run.job.clone(), run.causes.clone())
        };
        Ok(self.enqueue(job, TaskKind::Placeholder { owner: Some(owner) }, causes, label))
    }

    pub fn queued(&self, id: WorkItemId) -> Option<QueueItem> {
        self.lock().queue.get(&id).cloned()
    }

    /// Takes `id` off the queue and runs it on `node`. Steps run under their
    /// owner's id; everything else gets a new build.
    pub fn start(&self, id: WorkItemId, node: &NodeName) -> Result<Option<RunRef>, ClusterError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(node) {
            return Err(ClusterError::UnknownNode(node.clone()));
        }
        let item = inner.queue.remove(&id).ok_or(ClusterError::UnknownWorkItem(id))?;
        let running_id = item.effective_id();

        let run = match item.kind {
            TaskKind::Placeholder { .. } => None,
            _ => {
                let build = {
                    let next = inner.next_build.entry(item.job.clone()).or_insert(0);
                    *next += 1;
                    *next
                };
                let run = RunRef { id, job: item.job.clone(), build, building: true, causes: item.causes };
                inner.runs_by_id.insert(id, (run.job.clone(), build));
                inner.runs.insert((run.job.clone(), build), run.clone());
                Some(run)
            }
        };

        if let Some(state) = inner.nodes.get_mut(node) {
            if !state.running.contains(&running_id) {
                state.running.push(running_id);
            }
        }
        Ok(run)
    }

    /// Marks the run of `id` completed and frees its executors.
    pub fn finish(&self, id: WorkItemId) -> Result<(), ClusterError> {
        let mut inner = self.lock();
        if inner.run(id).is_none() {
            return Err(ClusterError::UnknownRun(id));
        }
        inner.finish_run(id);
        Ok(())
    }

    /// Forgets a run entirely, as when old builds are rotated away.
    pub fn rotate(&self, id: WorkItemId) {
        let mut inner = self.lock();
        if let Some(key) = inner.runs_by_id.remove(&id) {
            inner.runs.remove(&key);
        }
    }

    pub fn run(&self, id: WorkItemId) -> Option<RunRef> {
        self.lock().run(id).cloned()
    }

    /// The cause a run of `id` would attach to work it triggers.
    pub fn upstream_cause(&self, id: WorkItemId) -> Option<Cause> {
        self.run(id).map(|run| Cause::Upstream(UpstreamCause { job: run.job, build: run.build }))
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        let inner = self.lock();
        let mut runs: Vec<RunRef> = inner.runs.values().cloned().collect();
        runs.sort_by_key(|run| run.id);
        ClusterSnapshot {
            queue: inner.queue.values().cloned().collect(),
            runs,
            nodes: inner
                .nodes
                .values()
                .map(|state| NodeSnapshot { node: state.node.clone(), running: state.running.clone() })
                .collect(),
        }
    }
}

impl Inner {
    fn run(&self, id: WorkItemId) -> Option<&RunRef> {
        self.runs_by_id.get(&id).and_then(|key| self.runs.get(key))
    }

    fn finish_run(&mut self, id: WorkItemId) {
        if let Some(key) = self.runs_by_id.get(&id) {
            if let Some(run) = self.runs.get_mut(key) {
                run.building = false;
            }
        }
        for state in self.nodes.values_mut() {
            state.running.retain(|running| *running != id);
        }
    }
}

fn accepts(node: &NodeRef, label: Option<&str>) -> bool {
    match label {
        None => true,
        Some(label) => node.name.as_str() == label || node.labels.iter().any(|l| l == label),
    }
}

impl JobQueue for InMemoryCluster {
    fn queued_items(&self) -> Vec<QueueItem> {
        self.lock().queue.values().cloned().collect()
    }

    fn upstream_run(&self, cause: &UpstreamCause) -> Option<RunRef> {
        self.lock().runs.get(&(cause.job.clone(), cause.build)).cloned()
    }

    fn can_place_elsewhere(&self, item: &QueueItem, excluding: &NodeName) -> bool {
        self.lock()
            .nodes
            .values()
            .any(|state| state.node.online && &state.node.name != excluding && accepts(&state.node, item.label.as_deref()))
    }
}

impl NodeRegistry for InMemoryCluster {
    fn nodes(&self) -> Vec<NodeRef> {
        self.lock().nodes.values().map(|state| state.node.clone()).collect()
    }

    fn node(&self, name: &NodeName) -> Option<NodeRef> {
        self.lock().nodes.get(name).map(|state| state.node.clone())
    }

    fn currently_running(&self, name: &NodeName) -> Vec<WorkItemId> {
        self.lock().nodes.get(name).map(|state| state.running.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeName {
        NodeName::new(name)
    }

    #[test]
    fn test_new_cluster_is_empty() {
        let cluster = InMemoryCluster::new();
        let snap = cluster.snapshot();
        assert!(snap.queue.is_empty());
        assert!(snap.runs.is_empty());
        assert!(snap.nodes.is_empty());
    }

    #[test]
    fn test_ids_are_monotonic() {
        let cluster = InMemoryCluster::new();
        let a = cluster.issue_id();
        let b = cluster.issue_id();
        assert_eq!(a, WorkItemId(1));
        assert!(b > a);
    }

    #[test]
    fn test_start_moves_item_to_node() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &[]);
        let id = cluster.enqueue_project("app/build", vec![]);

        let run = cluster.start(id, &node("agent-1")).unwrap().unwrap();
        assert_eq!(run.build, 1);
        assert!(run.building);
        assert!(cluster.queued(id).is_none());
        assert_eq!(cluster.currently_running(&node("agent-1")), vec![id]);
    }

    #[test]
    fn test_builds_number_per_job() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &[]);
        let a = cluster.enqueue_project("app/build", vec![]);
        let b = cluster.enqueue_project("app/build", vec![]);
        cluster.start(a, &node("agent-1")).unwrap();
        let run = cluster.start(b, &node("agent-1")).unwrap().unwrap();
        assert_eq!(run.build, 2);
    }

    #[test]
    fn test_finish_frees_node_and_keeps_run() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &[]);
        let id = cluster.enqueue_project("app/build", vec![]);
        cluster.start(id, &node("agent-1")).unwrap();
        cluster.finish(id).unwrap();

        assert!(cluster.currently_running(&node("agent-1")).is_empty());
        assert!(!cluster.run(id).unwrap().building);
    }

    #[test]
    fn test_steps_run_under_owner_id() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &[]);
        cluster.add_node("agent-2", &[]);
        let owner = cluster.enqueue("pipe", TaskKind::Workflow, vec![], None);
        cluster.start(owner, &node("agent-1")).unwrap();

        let step = cluster.enqueue_step(owner, None).unwrap();
        assert_eq!(cluster.queued(step).unwrap().effective_id(), owner);
        assert!(cluster.start(step, &node("agent-2")).unwrap().is_none());
        assert_eq!(cluster.currently_running(&node("agent-2")), vec![owner]);
    }

    #[test]
    fn test_upstream_cause_resolves_until_rotated() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &[]);
        let id = cluster.enqueue_project("app/build", vec![]);
        cluster.start(id, &node("agent-1")).unwrap();

        let Some(Cause::Upstream(cause)) = cluster.upstream_cause(id) else {
            panic!("expected upstream cause");
        };
        assert_eq!(cluster.upstream_run(&cause).unwrap().id, id);

        cluster.rotate(id);
        assert!(cluster.upstream_run(&cause).is_none());
    }

    #[test]
    fn test_placement_respects_labels_and_online() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &["linux"]);
        cluster.add_node("agent-2", &["linux"]);
        cluster.add_node("mac-1", &["macos"]);
        let linux = cluster.enqueue("app/build", TaskKind::Project, vec![], Some("linux"));
        let mac = cluster.enqueue("app/ios", TaskKind::Project, vec![], Some("macos"));
        let linux = cluster.queued(linux).unwrap();
        let mac = cluster.queued(mac).unwrap();

        assert!(cluster.can_place_elsewhere(&linux, &node("agent-1")));
        assert!(!cluster.can_place_elsewhere(&mac, &node("mac-1")));

        cluster.set_online(&node("agent-2"), false).unwrap();
        assert!(!cluster.can_place_elsewhere(&linux, &node("agent-1")));
    }

    #[test]
    fn test_unknown_node_and_item_errors() {
        let cluster = InMemoryCluster::new();
        assert_eq!(cluster.start(WorkItemId(9), &node("ghost")), Err(ClusterError::UnknownNode(node("ghost"))));
        cluster.add_node("agent-1", &[]);
        assert_eq!(cluster.start(WorkItemId(9), &node("agent-1")), Err(ClusterError::UnknownWorkItem(WorkItemId(9))));
        assert_eq!(cluster.finish(WorkItemId(9)), Err(ClusterError::UnknownRun(WorkItemId(9))));
    }

    #[test]
    fn test_remove_node_finishes_its_runs() {
        let cluster = InMemoryCluster::new();
        cluster.add_node("agent-1", &[]);
        let id = cluster.enqueue_project("app/build", vec![]);
        cluster.start(id, &node("agent-1")).unwrap();
        cluster.remove_node(&node("agent-1")).unwrap();

        assert!(cluster.node(&node("agent-1")).is_none());
        assert!(!cluster.run(id).unwrap().building);
    }
}
