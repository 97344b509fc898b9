//! Scenario replay: a YAML description of a cluster and a list of steps,
//! run against [`InMemoryCluster`] with a live [`LenientShutdown`].
//!
//! ```yaml
//! name: downstream keeps going
//! nodes: [{ name: agent-1 }]
//! runs:
//!   - { key: compile, job: app/compile, node: agent-1 }
//! queue:
//!   - { key: test, job: app/test, upstream: [compile] }
//! steps:
//!   - step: start
//!   - { step: decide, item: test, expect: allow }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use lenient_cluster::{ClusterSnapshot, InMemoryCluster};
use lenient_core::{
    Cause, LenientShutdown, NodeName, PermissionRecord, ShutdownConfig, ShutdownScope, TaskKind, Verdict, WorkItemId,
};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub config: ShutdownConfig,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub runs: Vec<RunDef>,
    #[serde(default)]
    pub queue: Vec<ItemDef>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct NodeDef {
    pub name: NodeName,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A build already started when the scenario begins.
#[derive(Debug, Deserialize)]
pub struct RunDef {
    pub key: String,
    pub job: String,
    pub node: NodeName,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub finished: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Project,
    Workflow,
    Foreign,
}

#[derive(Debug, Deserialize)]
pub struct ItemDef {
    pub key: String,
    /// Required unless `step_of` is set.
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Key of a started run this item is a step of.
    #[serde(default)]
    pub step_of: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub expect: Option<Outcome>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Action {
    /// Shutdown starts, globally or for one node.
    Start {
        #[serde(default)]
        node: Option<NodeName>,
    },
    Cancel {
        #[serde(default)]
        node: Option<NodeName>,
    },
    DeleteNode {
        node: NodeName,
    },
    Enqueue(ItemDef),
    /// Take a queued item off the queue and start it.
    Run {
        item: String,
        node: NodeName,
    },
    Finish {
        item: String,
    },
    Decide {
        item: String,
    },
    DecideOnNode {
        item: String,
        node: NodeName,
    },
    Drained {
        node: NodeName,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = |node: &Option<NodeName>| node.as_ref().map_or("global".to_string(), |n| format!("node {n}"));
        match self {
            Action::Start { node } => write!(f, "start {}", scope(node)),
            Action::Cancel { node } => write!(f, "cancel {}", scope(node)),
            Action::DeleteNode { node } => write!(f, "delete node {node}"),
            Action::Enqueue(item) => write!(f, "enqueue {}", item.key),
            Action::Run { item, node } => write!(f, "run {item} on {node}"),
            Action::Finish { item } => write!(f, "finish {item}"),
            Action::Decide { item } => write!(f, "decide {item}"),
            Action::DecideOnNode { item, node } => write!(f, "decide {item} on {node}"),
            Action::Drained { node } => write!(f, "drained {node}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Allow,
    Block,
    Drained,
    Busy,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: String,
    pub expected: Option<Outcome>,
    pub actual: Outcome,
    /// Block reason text for blocked verdicts.
    pub reason: Option<String>,
}

impl StepReport {
    pub fn matches(&self) -> bool {
        self.expected.map_or(true, |expected| expected == self.actual)
    }
}

/// One row of the global permission table.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RecordRow {
    pub id: WorkItemId,
    pub record: PermissionRecord,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub steps: Vec<StepReport>,
    /// Global classifications left after the last step.
    pub registry: Vec<RecordRow>,
    /// Queue, runs and nodes after the last step.
    pub cluster: ClusterSnapshot,
}

impl ScenarioResult {
    pub fn mismatches(&self) -> Vec<&StepReport> {
        self.steps.iter().filter(|s| !s.matches()).collect()
    }

    pub fn passed(&self) -> bool {
        self.steps.iter().all(StepReport::matches)
    }

    pub fn outcome_of(&self, index: usize) -> Option<Outcome> {
        self.steps.get(index).map(|s| s.actual)
    }

    pub fn record_of(&self, id: WorkItemId) -> PermissionRecord {
        self.registry.iter().find(|row| row.id == id).map(|row| row.record).unwrap_or_default()
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read scenario: {}", path.display()))?;
    let scenario: Scenario = serde_yaml::from_str(&s).with_context(|| format!("parse scenario: {}", path.display()))?;
    Ok(scenario)
}

pub fn simulate_file(path: &Path) -> Result<ScenarioResult> {
    simulate(&load_scenario(path)?)
}

/// Builds the initial cluster, then replays every step in order. Fails only
/// on malformed scenarios (unknown keys, nodes or runs); verdicts that differ
/// from expectations are reported, not raised.
pub fn simulate(scenario: &Scenario) -> Result<ScenarioResult> {
    scenario.config.validate().context("scenario config")?;
    let mut replay = Replay::new(scenario.config.clone());

    for node in &scenario.nodes {
        let labels: Vec<&str> = node.labels.iter().map(String::as_str).collect();
        replay.cluster.add_node(node.name.clone(), &labels);
    }
    for run in &scenario.runs {
        let causes = replay.causes(&run.upstream, run.user.as_deref())?;
        let id = replay.cluster.enqueue_project(run.job.as_str(), causes);
        replay.cluster.start(id, &run.node).with_context(|| format!("start run {}", run.key))?;
        if run.finished {
            replay.cluster.finish(id)?;
        }
        replay.keys.insert(run.key.clone(), id);
    }
    for item in &scenario.queue {
        replay.enqueue(item)?;
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let (actual, reason) = replay.apply(&step.action).with_context(|| format!("step {index}: {}", step.action))?;
        debug!(index, step = %step.action, ?actual, "replayed step");
        steps.push(StepReport { index, step: step.action.to_string(), expected: step.expect, actual, reason });
    }

    let registry =
        replay.shutdown.registry().snapshot().into_iter().map(|(id, record)| RecordRow { id, record }).collect();
    Ok(ScenarioResult { name: scenario.name.clone(), steps, registry, cluster: replay.cluster.snapshot() })
}

struct Replay {
    cluster: Arc<InMemoryCluster>,
    shutdown: LenientShutdown,
    keys: HashMap<String, WorkItemId>,
}

impl Replay {
    fn new(config: ShutdownConfig) -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let shutdown = LenientShutdown::new(cluster.clone(), cluster.clone(), config);
        Self { cluster, shutdown, keys: HashMap::new() }
    }

    fn id(&self, key: &str) -> Result<WorkItemId> {
        self.keys.get(key).copied().ok_or_else(|| anyhow!("unknown item key {key:?}"))
    }

    fn causes(&self, upstream: &[String], user: Option<&str>) -> Result<Vec<Cause>> {
        let mut causes = upstream
            .iter()
            .map(|key| {
                let id = self.id(key)?;
                self.cluster.upstream_cause(id).ok_or_else(|| anyhow!("{key:?} has no run to trigger from"))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(user_id) = user {
            causes.push(Cause::User { user_id: user_id.to_string() });
        }
        Ok(causes)
    }

    fn enqueue(&mut self, item: &ItemDef) -> Result<()> {
        let id = match &item.step_of {
            Some(owner) => self.cluster.enqueue_step(self.id(owner)?, item.label.as_deref())?,
            None => {
                let job = item.job.as_deref().ok_or_else(|| anyhow!("item {:?} needs a job", item.key))?;
                let kind = match item.kind {
                    ItemKind::Project => TaskKind::Project,
                    ItemKind::Workflow => TaskKind::Workflow,
                    ItemKind::Foreign => TaskKind::Foreign,
                };
                let causes = self.causes(&item.upstream, item.user.as_deref())?;
                self.cluster.enqueue(job, kind, causes, item.label.as_deref())
            }
        };
        self.keys.insert(item.key.clone(), id);
        Ok(())
    }

    fn apply(&mut self, action: &Action) -> Result<(Outcome, Option<String>)> {
        match action {
            Action::Start { node } => self.shutdown.notify_shutdown_started(&scope(node)),
            Action::Cancel { node } => self.shutdown.notify_shutdown_cancelled(&scope(node)),
            Action::DeleteNode { node } => {
                self.cluster.remove_node(node)?;
                self.shutdown.notify_node_deleted(node);
            }
            Action::Enqueue(item) => self.enqueue(item)?,
            Action::Run { item, node } => {
                self.cluster.start(self.id(item)?, node)?;
            }
            Action::Finish { item } => self.cluster.finish(self.id(item)?)?,
            Action::Decide { item } => {
                let queued = self.queued(item)?;
                return Ok(verdict_outcome(self.shutdown.decide(&queued)));
            }
            Action::DecideOnNode { item, node } => {
                let queued = self.queued(item)?;
                return Ok(verdict_outcome(self.shutdown.decide_on_node(&queued, node)));
            }
            Action::Drained { node } => {
                let outcome = if self.shutdown.is_node_drained(node) { Outcome::Drained } else { Outcome::Busy };
                return Ok((outcome, None));
            }
        }
        Ok((Outcome::Done, None))
    }

    fn queued(&self, key: &str) -> Result<lenient_core::QueueItem> {
        let id = self.id(key)?;
        self.cluster.queued(id).ok_or_else(|| anyhow!("{key:?} is not queued"))
    }
}

fn scope(node: &Option<NodeName>) -> ShutdownScope {
    match node {
        Some(node) => ShutdownScope::Node(node.clone()),
        None => ShutdownScope::Global,
    }
}

fn verdict_outcome(verdict: Verdict) -> (Outcome, Option<String>) {
    match verdict {
        Verdict::Allow => (Outcome::Allow, None),
        Verdict::Block(reason) => (Outcome::Block, Some(reason.to_string())),
    }
}
