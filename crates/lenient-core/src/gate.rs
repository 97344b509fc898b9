//! Global admission gate.
//!
//! Per candidate, while global shutdown is active:
//! - placeholder steps of running executions always pass;
//! - a recorded classification is returned as-is;
//! - foreign task kinds pass and open an active chain;
//! - jobs are classified once: upstream-permitted, then allow-listed, else blocked.
//!
//! Upstream permission wins over allow-listing when both apply.

use tracing::debug;

use crate::causation::CausationGraph;
use crate::shutdown::ShutdownState;
use crate::{
    BlockReason, Candidate, Cause, JobName, JobQueue, NodeRegistry, PermissionRecord, PermissionRegistry,
    QueueItem, ShutdownConfig, Verdict, WorkItemId,
};

/// Borrowed view of everything one admission check reads.
#[derive(Clone, Copy)]
pub struct Admission<'a> {
    pub state: &'a ShutdownState,
    pub registry: &'a PermissionRegistry,
    pub config: &'a ShutdownConfig,
    pub queue: &'a dyn JobQueue,
    pub nodes: &'a dyn NodeRegistry,
}

pub fn decide(ctx: &Admission<'_>, item: &QueueItem) -> Verdict {
    if !ctx.state.is_global_active() {
        return Verdict::Allow;
    }

    match Candidate::of(item, ctx.queue.is_buildable_as_placeholder(item)) {
        Candidate::InFlightStep { owner } => {
            debug!(job = %item.job, id = %item.id, ?owner, "permitting step of a running execution");
            Verdict::Allow
        }
        Candidate::Foreign { id } => {
            let class = ctx.registry.record_active_chain(id);
            verdict_for(ctx, class)
        }
        Candidate::Job { id, job, causes } => {
            let cached = ctx.registry.classify(id);
            if cached.is_classified() {
                return verdict_for(ctx, cached);
            }
            let class = classify_job(ctx, job, causes);
            let winner = ctx.registry.record(id, class);
            log_outcome(job, id, winner);
            verdict_for(ctx, winner)
        }
    }
}

/// Classification a job would get if it were evaluated now. Pure read.
pub fn classify_job(ctx: &Admission<'_>, job: &JobName, causes: &[Cause]) -> PermissionRecord {
    let graph = CausationGraph::new(ctx.queue);

    let permitted_upstream = graph.find_ancestor(causes, |id| ctx.registry.classify(id).grants_upstream_permission());
    if permitted_upstream.is_some() {
        return PermissionRecord::UpstreamPermittedChain;
    }

    let others_active = ctx.registry.has_active_chains();
    let listed_self = others_active && ctx.config.is_allow_listed(job);
    let listed_upstream = graph.upstream_runs(causes).iter().any(|run| {
        ctx.registry.classify(run.id) == PermissionRecord::AllowListedChain
            || (others_active && ctx.config.is_allow_listed(&run.job))
    });
    if listed_self || listed_upstream {
        return PermissionRecord::AllowListedChain;
    }

    PermissionRecord::Blocked
}

fn verdict_for(ctx: &Admission<'_>, class: PermissionRecord) -> Verdict {
    if class == PermissionRecord::Blocked {
        Verdict::Block(BlockReason::GlobalShutdown { message: ctx.config.shutdown_message.clone() })
    } else {
        Verdict::Allow
    }
}

fn log_outcome(job: &JobName, id: WorkItemId, class: PermissionRecord) {
    if class == PermissionRecord::Blocked {
        debug!(%job, %id, "preventing job from running, lenient shutdown is active");
    } else {
        debug!(%job, %id, ?class, "permitting job to start even though lenient shutdown is pending");
    }
}
