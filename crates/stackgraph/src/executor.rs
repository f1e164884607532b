//! Execution engine - applies a plan phase by phase with parallelism

use crate::context::{ApplyRequest, ConfirmCallback, ProgressCallback, Provider};
use crate::error::{Error, Result};
use crate::planner::{ExecutionPlan, PlanStep, PlannedDeletion};
use crate::retry::{LogCallback, with_retry};
use crate::snapshot::Snapshot;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary, Operation, RetryConfig};
use crate::value::{AttributeStore, Attributes};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Everything an apply produced
#[derive(Debug, Clone, Default)]
pub struct ExecuteOutcome {
    pub summary: ExecuteSummary,
    /// Per-resource results in execution order, deletions last
    pub results: Vec<(String, ApplyResult)>,
    /// Prior state with this run's changes applied
    pub snapshot: Snapshot,
    /// Attributes of every realized resource
    pub attributes: AttributeStore,
}

impl ExecuteOutcome {
    fn push(&mut self, id: &str, result: ApplyResult) {
        self.summary.add_result(&result);
        self.results.push((id.to_string(), result));
    }

    pub fn result(&self, id: &str) -> Option<&ApplyResult> {
        self.results
            .iter()
            .find(|(rid, _)| rid == id)
            .map(|(_, result)| result)
    }
}

/// A step that ran: its result plus what to record on success
struct StepOutcome {
    result: ApplyResult,
    realized: Option<(BTreeMap<String, Value>, Attributes)>,
}

impl StepOutcome {
    fn failed(error: &Error) -> Self {
        Self {
            result: ApplyResult::Failed {
                error: error.to_string(),
            },
            realized: None,
        }
    }
}

/// Execute a plan against a provider
///
/// Phases run in order; steps inside a phase run in parallel on a pool of
/// `opts.jobs` threads. A step whose dependency failed or was skipped is
/// skipped itself. Deletions run last, one at a time. Provider errors are
/// reported per resource in the outcome rather than returned.
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    prior: Option<&Snapshot>,
    provider: &dyn Provider,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteOutcome>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let snapshot = prior.cloned().unwrap_or_default();
    let mut outcome = ExecuteOutcome {
        attributes: snapshot.attribute_store(),
        snapshot,
        ..Default::default()
    };

    let planned = plan.summary();
    if !planned.has_changes() {
        for step in &plan.steps {
            outcome.push(step.id(), ApplyResult::NoChange);
        }
        return Ok(outcome);
    }

    if opts.dry_run {
        skip_all(plan, &mut outcome, "dry run");
        return Ok(outcome);
    }

    if !confirm.confirm(&format!("Apply {} changes?", planned.changes()))? {
        skip_all(plan, &mut outcome, "not confirmed");
        return Ok(outcome);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Executor(format!("failed to create thread pool: {e}")))?;

    let mut unavailable: HashSet<String> = HashSet::new();
    let mut changed: HashSet<String> = HashSet::new();
    let phases = plan.phases();

    for (index, phase) in phases.iter().enumerate() {
        progress.on_phase_start(index, phase.len());

        let (blocked, runnable): (Vec<&PlanStep>, Vec<&PlanStep>) =
            phase.iter().copied().partition(|s| {
                s.operation.is_change() && s.dependencies.iter().any(|d| unavailable.contains(d))
            });

        for step in &blocked {
            let reason = step
                .dependencies
                .iter()
                .find(|d| unavailable.contains(*d))
                .map_or_else(String::new, |d| format!("dependency '{d}' was not applied"));
            let result = ApplyResult::Skipped { reason };
            progress.on_resource_complete(step.id(), &result);
            outcome.push(step.id(), result);
        }
        unavailable.extend(blocked.iter().map(|s| s.id().to_string()));

        for step in &runnable {
            progress.on_resource_start(step.id(), &step.descriptor.description());
        }

        let store = &outcome.attributes;
        let realized = &outcome.snapshot;
        let upstream = &changed;
        let step_outcomes: Vec<StepOutcome> = pool.install(|| {
            runnable
                .par_iter()
                .map(|step| apply_step(step, store, realized, upstream, provider, &opts.retry))
                .collect()
        });

        for (step, step_outcome) in runnable.iter().zip(step_outcomes) {
            progress.on_resource_complete(step.id(), &step_outcome.result);
            if step_outcome.result.is_change() {
                changed.insert(step.id().to_string());
            }
            match step_outcome.realized {
                Some((arguments, attributes)) => {
                    outcome.attributes.insert(step.id(), attributes.clone());
                    outcome.snapshot.record(
                        step.id(),
                        step.kind().clone(),
                        step.fingerprint.clone(),
                        arguments,
                        attributes,
                    );
                }
                None if !step_outcome.result.is_success() => {
                    unavailable.insert(step.id().to_string());
                }
                None => {}
            }
            outcome.push(step.id(), step_outcome.result);
        }

        progress.on_phase_complete(index);
    }

    if !plan.deletions.is_empty() {
        let index = phases.len();
        progress.on_phase_start(index, plan.deletions.len());
        for deletion in &plan.deletions {
            progress.on_resource_start(&deletion.id, &format!("{} {}", deletion.kind, deletion.id));
            let result = delete_resource(deletion, &mut outcome, provider, &opts.retry);
            progress.on_resource_complete(&deletion.id, &result);
            outcome.push(&deletion.id, result);
        }
        progress.on_phase_complete(index);
    }

    log::info!(
        "Applied plan: {} changed, {} failed, {} skipped",
        outcome.summary.total_changes(),
        outcome.summary.failed,
        outcome.summary.skipped
    );
    Ok(outcome)
}

/// Record every change as skipped, no-ops as unchanged
fn skip_all(plan: &ExecutionPlan, outcome: &mut ExecuteOutcome, reason: &str) {
    for step in &plan.steps {
        let result = if step.operation.is_change() {
            ApplyResult::Skipped {
                reason: reason.to_string(),
            }
        } else {
            ApplyResult::NoChange
        };
        outcome.push(step.id(), result);
    }
    for deletion in &plan.deletions {
        outcome.push(
            &deletion.id,
            ApplyResult::Skipped {
                reason: reason.to_string(),
            },
        );
    }
}

/// Resolve a step's arguments and hand it to the provider
///
/// A no-op step whose dependency changed in this run is re-resolved; if
/// its resolved arguments differ from the recorded ones it is updated.
fn apply_step(
    step: &PlanStep,
    store: &AttributeStore,
    realized: &Snapshot,
    upstream: &HashSet<String>,
    provider: &dyn Provider,
    retry: &RetryConfig,
) -> StepOutcome {
    let unchanged = StepOutcome {
        result: ApplyResult::NoChange,
        realized: None,
    };
    if step.operation == Operation::NoOp && !step.dependencies.iter().any(|d| upstream.contains(d))
    {
        return unchanged;
    }

    let arguments = match resolve_arguments(step, store) {
        Ok(arguments) => arguments,
        Err(e) => return StepOutcome::failed(&e),
    };

    let mut operation = step.operation;
    if operation == Operation::NoOp {
        if realized.get(step.id()).map(|r| &r.arguments) == Some(&arguments) {
            return unchanged;
        }
        log::info!("{} changed upstream, updating", step.id());
        operation = Operation::Update;
    }
    let request = ApplyRequest {
        id: step.id(),
        kind: step.kind(),
        arguments: &arguments,
    };
    let callback = LogCallback(step.id());

    let applied = match operation {
        Operation::Update => {
            let current = realized
                .get(step.id())
                .map(|r| r.attributes.clone())
                .unwrap_or_default();
            with_retry(retry, Some(&callback), || provider.update(&request, &current))
                .map(|attributes| (ApplyResult::Modified, attributes))
        }
        _ => with_retry(retry, Some(&callback), || provider.create(&request))
            .map(|attributes| (ApplyResult::Created, attributes)),
    };

    match applied {
        Ok((result, attributes)) => {
            log::debug!("{operation} {}", step.descriptor.description());
            StepOutcome {
                result,
                realized: Some((arguments, attributes)),
            }
        }
        Err(e) => {
            log::error!("Failed to {operation} {}: {e}", step.id());
            StepOutcome::failed(&e)
        }
    }
}

fn resolve_arguments(step: &PlanStep, store: &AttributeStore) -> Result<BTreeMap<String, Value>> {
    step.descriptor
        .arguments
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.resolve(store)?)))
        .collect()
}

fn delete_resource(
    deletion: &PlannedDeletion,
    outcome: &mut ExecuteOutcome,
    provider: &dyn Provider,
    retry: &RetryConfig,
) -> ApplyResult {
    let current = outcome
        .snapshot
        .get(&deletion.id)
        .map(|r| r.attributes.clone())
        .unwrap_or_default();
    let callback = LogCallback(&deletion.id);

    match with_retry(retry, Some(&callback), || {
        provider.delete(&deletion.id, &deletion.kind, &current)
    }) {
        Ok(()) => {
            outcome.snapshot.remove(&deletion.id);
            outcome.attributes.remove(&deletion.id);
            ApplyResult::Removed
        }
        Err(e) => {
            log::error!("Failed to delete {}: {e}", deletion.id);
            ApplyResult::Failed {
                error: e.to_string(),
            }
        }
    }
}
