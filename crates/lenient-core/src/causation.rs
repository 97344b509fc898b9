//! Trigger-history queries over the host queue.
//!
//! Only direct upstream runs are resolved per step; callers that need to go
//! further walk with [`CausationGraph::find_ancestor`], which is bounded by
//! [`MAX_UPSTREAM_DEPTH`] and a visited set so a cyclic trigger history from a
//! misbehaving host cannot loop.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::{Cause, JobQueue, RunRef, WorkItemId};

pub const MAX_UPSTREAM_DEPTH: usize = 64;

pub struct CausationGraph<'a> {
    queue: &'a dyn JobQueue,
}

impl<'a> CausationGraph<'a> {
    pub fn new(queue: &'a dyn JobQueue) -> Self {
        Self { queue }
    }

    /// Direct upstream runs of a work-item with the given causes, in cause order.
    ///
    /// A user cause anywhere in the list voids the whole chain. Upstream causes
    /// whose run is gone are dropped.
    pub fn upstream_runs(&self, causes: &[Cause]) -> Vec<RunRef> {
        if is_user_initiated(causes) {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        causes
            .iter()
            .filter_map(|cause| match cause {
                Cause::Upstream(upstream) => self.queue.upstream_run(upstream),
                Cause::User { .. } | Cause::Other { .. } => None,
            })
            .filter(|run| seen.insert(run.id))
            .collect()
    }

    pub fn upstream_ids(&self, causes: &[Cause]) -> BTreeSet<WorkItemId> {
        self.upstream_runs(causes).into_iter().map(|run| run.id).collect()
    }

    /// Breadth-first search through the ancestry for the nearest id matching
    /// `pred`. Direct upstream runs are depth 1.
    pub fn find_ancestor(&self, causes: &[Cause], pred: impl Fn(WorkItemId) -> bool) -> Option<WorkItemId> {
        let mut visited = HashSet::new();
        let mut frontier: VecDeque<(RunRef, usize)> = self.upstream_runs(causes).into_iter().map(|run| (run, 1)).collect();

        while let Some((run, depth)) = frontier.pop_front() {
            if !visited.insert(run.id) {
                continue;
            }
            if pred(run.id) {
                return Some(run.id);
            }
            if depth >= MAX_UPSTREAM_DEPTH {
                continue;
            }
            frontier.extend(self.upstream_runs(&run.causes).into_iter().map(|parent| (parent, depth + 1)));
        }
        None
    }
}

pub fn is_user_initiated(causes: &[Cause]) -> bool {
    causes.iter().any(|cause| matches!(cause, Cause::User { .. }))
}

/// Whether any of the given upstream runs is still executing.
pub fn any_still_building(runs: &[RunRef]) -> bool {
    runs.iter().any(|run| run.building)
}

/// Whether at least one upstream run finished, or, with
/// `allow_all_downstream`, whether one is still building.
pub fn any_upstream_settled(runs: &[RunRef], allow_all_downstream: bool) -> bool {
    runs.iter().any(|run| !run.building) || (allow_all_downstream && any_still_building(runs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{JobName, NodeName, QueueItem, UpstreamCause};

    #[derive(Default)]
    struct Runs(HashMap<(String, u64), RunRef>);

    impl Runs {
        fn add(&mut self, id: u64, job: &str, build: u64, building: bool, causes: Vec<Cause>) {
            self.0.insert(
                (job.to_string(), build),
                RunRef { id: WorkItemId(id), job: JobName::from(job), build, building, causes },
            );
        }
    }

    impl JobQueue for Runs {
        fn queued_items(&self) -> Vec<QueueItem> {
            vec![]
        }
        fn upstream_run(&self, cause: &UpstreamCause) -> Option<RunRef> {
            self.0.get(&(cause.job.0.clone(), cause.build)).cloned()
        }
        fn can_place_elsewhere(&self, _item: &QueueItem, _excluding: &NodeName) -> bool {
            true
        }
    }

    fn up(job: &str, build: u64) -> Cause {
        Cause::Upstream(UpstreamCause { job: JobName::from(job), build })
    }

    fn user() -> Cause {
        Cause::User { user_id: "alice".into() }
    }

    #[test]
    fn user_cause_voids_upstream_chain() {
        let mut runs = Runs::default();
        runs.add(1, "compile", 1, true, vec![]);
        let graph = CausationGraph::new(&runs);

        assert_eq!(graph.upstream_ids(&[up("compile", 1)]), BTreeSet::from([WorkItemId(1)]));
        assert!(graph.upstream_ids(&[up("compile", 1), user()]).is_empty());
        assert!(graph.upstream_ids(&[user(), up("compile", 1)]).is_empty());
    }

    #[test]
    fn unresolvable_upstream_is_dropped() {
        let mut runs = Runs::default();
        runs.add(1, "compile", 1, false, vec![]);
        let graph = CausationGraph::new(&runs);

        let ids = graph.upstream_ids(&[up("compile", 1), up("rotated", 9), Cause::Other { description: "timer".into() }]);
        assert_eq!(ids, BTreeSet::from([WorkItemId(1)]));
    }

    #[test]
    fn duplicate_causes_collapse() {
        let mut runs = Runs::default();
        runs.add(1, "compile", 1, false, vec![]);
        let graph = CausationGraph::new(&runs);
        assert_eq!(graph.upstream_runs(&[up("compile", 1), up("compile", 1)]).len(), 1);
    }

    #[test]
    fn find_ancestor_walks_transitively() {
        let mut runs = Runs::default();
        runs.add(1, "root", 1, true, vec![]);
        runs.add(2, "mid", 1, true, vec![up("root", 1)]);
        runs.add(3, "leaf", 1, true, vec![up("mid", 1)]);
        let graph = CausationGraph::new(&runs);

        assert_eq!(graph.find_ancestor(&[up("leaf", 1)], |id| id == WorkItemId(1)), Some(WorkItemId(1)));
        assert_eq!(graph.find_ancestor(&[up("leaf", 1)], |id| id == WorkItemId(42)), None);
    }

    #[test]
    fn find_ancestor_stops_at_user_triggered_ancestor() {
        let mut runs = Runs::default();
        runs.add(1, "root", 1, true, vec![]);
        runs.add(2, "rebuilt", 1, true, vec![up("root", 1), user()]);
        let graph = CausationGraph::new(&runs);

        assert_eq!(graph.find_ancestor(&[up("rebuilt", 1)], |id| id == WorkItemId(1)), None);
    }

    #[test]
    fn find_ancestor_survives_cycles() {
        let mut runs = Runs::default();
        runs.add(1, "a", 1, true, vec![up("b", 1)]);
        runs.add(2, "b", 1, true, vec![up("a", 1)]);
        let graph = CausationGraph::new(&runs);

        assert_eq!(graph.find_ancestor(&[up("a", 1)], |_| false), None);
    }

    #[test]
    fn find_ancestor_gives_up_past_max_depth() {
        // run k is triggered by run k + 1; run 1 is the direct upstream
        let mut runs = Runs::default();
        let top = MAX_UPSTREAM_DEPTH as u64 + 5;
        for k in 1..=top {
            let causes = if k < top { vec![up(&format!("j{}", k + 1), 1)] } else { vec![] };
            runs.add(k, &format!("j{k}"), 1, true, causes);
        }
        let graph = CausationGraph::new(&runs);
        let within = WorkItemId(MAX_UPSTREAM_DEPTH as u64);
        let beyond = WorkItemId(MAX_UPSTREAM_DEPTH as u64 + 1);

        assert_eq!(graph.find_ancestor(&[up("j1", 1)], |id| id == within), Some(within));
        assert_eq!(graph.find_ancestor(&[up("j1", 1)], |id| id == beyond), None);
        assert_eq!(graph.find_ancestor(&[up("j1", 1)], |id| id == WorkItemId(top)), None);
    }

    #[test]
    fn settled_upstream_respects_downstream_flag() {
        let building = RunRef { id: WorkItemId(1), job: JobName::from("a"), build: 1, building: true, causes: vec![] };
        let done = RunRef { building: false, ..building.clone() };

        assert!(any_still_building(&[building.clone(), done.clone()]));
        assert!(!any_still_building(&[done.clone()]));
        assert!(!any_upstream_settled(&[building.clone()], false));
        assert!(any_upstream_settled(&[building.clone()], true));
        assert!(any_upstream_settled(&[building, done], false));
        assert!(!any_upstream_settled(&[], true));
    }
}
