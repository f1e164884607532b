//! Plan builder - orders resolved descriptors into an execution plan

use crate::diff::{PlanSummary, classify, fingerprint};
use crate::error::Result;
use crate::resolver::{DependencyGraph, resolve};
use crate::resource::ResourceDescriptor;
use crate::snapshot::Snapshot;
use crate::types::{Operation, ResourceKind};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

/// One resource in plan order
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub descriptor: ResourceDescriptor,
    pub operation: Operation,
    /// Steps sharing a phase do not depend on each other
    pub phase: usize,
    /// Direct dependencies, in declaration order
    pub dependencies: Vec<String>,
    pub fingerprint: String,
}

impl PlanStep {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.descriptor.kind
    }
}

/// A resource in prior state that is no longer declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDeletion {
    pub id: String,
    pub kind: ResourceKind,
}

/// An ordered plan: every dependency precedes its dependents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    /// Run after all steps, most recently realized first
    pub deletions: Vec<PlannedDeletion>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource ids in plan order
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(PlanStep::id).collect()
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// Steps grouped by phase; each group can run concurrently
    pub fn phases(&self) -> Vec<Vec<&PlanStep>> {
        let count = self.steps.iter().map(|s| s.phase + 1).max().unwrap_or(0);
        let mut phases = vec![Vec::new(); count];
        for step in &self.steps {
            phases[step.phase].push(step);
        }
        phases
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for step in &self.steps {
            summary.add(step.operation);
        }
        for _ in &self.deletions {
            summary.add(Operation::Delete);
        }
        summary
    }

    pub fn has_changes(&self) -> bool {
        self.summary().has_changes()
    }

    /// Total number of entries in the plan
    pub fn len(&self) -> usize {
        self.steps.len() + self.deletions.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.deletions.is_empty()
    }

    /// Filter plan to resources matching a target, plus their dependencies
    ///
    /// Target format: `kind`, `kind.name` or a bare resource id. A kind may
    /// be shortened to its service prefix (`sqs`, `lambda`, ...). Deletions
    /// are never part of a targeted plan.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        let Some(target) = target else {
            return self;
        };
        let (kind, name) = parse_target(target);

        let mut keep: BTreeSet<String> = self
            .steps
            .iter()
            .filter(|s| matches_filter(s, kind.as_deref(), name.as_deref()))
            .map(|s| s.id().to_string())
            .collect();

        // Dependencies always precede dependents, so one backward pass
        // collects the transitive closure.
        for step in self.steps.iter().rev() {
            if keep.contains(step.id()) {
                keep.extend(step.dependencies.iter().cloned());
            }
        }

        let steps = self
            .steps
            .into_iter()
            .filter(|s| keep.contains(s.id()))
            .collect();

        log::debug!("Target '{target}' selected {} resources", keep.len());
        Self {
            steps,
            deletions: Vec::new(),
        }
    }

    /// JSON rendering of the plan, arguments in canonical form
    pub fn to_json(&self) -> Value {
        let steps: Vec<Value> = self
            .steps
            .iter()
            .map(|step| {
                let arguments: Map<String, Value> = step
                    .descriptor
                    .arguments
                    .iter()
                    .map(|(name, value)| (name.clone(), value.canonical()))
                    .collect();
                json!({
                    "id": step.id(),
                    "kind": step.kind().to_string(),
                    "operation": step.operation,
                    "phase": step.phase,
                    "dependencies": step.dependencies,
                    "fingerprint": step.fingerprint,
                    "arguments": arguments,
                })
            })
            .collect();
        let deletions: Vec<Value> = self
            .deletions
            .iter()
            .map(|d| json!({ "id": d.id, "kind": d.kind.to_string(), "operation": Operation::Delete }))
            .collect();

        json!({
            "steps": steps,
            "deletions": deletions,
            "summary": self.summary(),
        })
    }
}

/// Build a plan from an already-resolved graph
///
/// Fails only if the graph is cyclic.
pub fn build_plan(
    graph: &DependencyGraph,
    descriptors: &[ResourceDescriptor],
    prior: Option<&Snapshot>,
) -> Result<ExecutionPlan> {
    let order = graph.topological_order()?;
    let phases = graph.phases(&order);

    let steps = order
        .into_iter()
        .map(|i| {
            let descriptor = descriptors[i].clone();
            let fingerprint = fingerprint(&descriptor);
            let operation = classify(&descriptor, &fingerprint, prior);
            let dependencies = graph
                .dependencies(&descriptor.id)
                .into_iter()
                .map(str::to_string)
                .collect();
            PlanStep {
                descriptor,
                operation,
                phase: phases[i],
                dependencies,
                fingerprint,
            }
        })
        .collect();

    let deletions = prior
        .map(|snapshot| {
            snapshot
                .reverse_realization_order()
                .into_iter()
                .filter(|id| graph.position(id).is_none())
                .filter_map(|id| {
                    snapshot.get(id).map(|realized| PlannedDeletion {
                        id: id.to_string(),
                        kind: realized.kind.clone(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ExecutionPlan { steps, deletions })
}

/// Resolve references and build a plan in one go
pub fn plan(descriptors: &[ResourceDescriptor], prior: Option<&Snapshot>) -> Result<ExecutionPlan> {
    let graph = resolve(descriptors)?;
    build_plan(&graph, descriptors, prior)
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.len() {
        1 => (Some(parts[0].to_string()), None),
        2 => (Some(parts[0].to_string()), Some(parts[1].to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if a step matches the filter criteria
fn matches_filter(step: &PlanStep, kind: Option<&str>, name: Option<&str>) -> bool {
    let descriptor = &step.descriptor;

    if let Some(k) = kind {
        let matches_kind = descriptor.kind.as_str() == k
            || descriptor.kind.to_string() == k
            || descriptor.kind.service() == k;
        // A single word may also be a plain resource id
        let matches_id = name.is_none() && descriptor.id == k;
        if !matches_kind && !matches_id {
            return false;
        }
    }

    if let Some(n) = name
        && !descriptor.id.contains(n)
    {
        return false;
    }

    true
}
