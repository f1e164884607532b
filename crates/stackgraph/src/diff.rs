//! Change detection against prior state

use crate::resource::ResourceDescriptor;
use crate::snapshot::Snapshot;
use crate::types::Operation;
use serde::{Deserialize, Serialize};

/// BLAKE3 fingerprint of a descriptor's canonical form
///
/// References are fingerprinted symbolically, so a resource whose upstream
/// changes but whose own declaration doesn't keeps its fingerprint.
pub fn fingerprint(descriptor: &ResourceDescriptor) -> String {
    let canonical = descriptor.canonical().to_string();
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

/// Decide what has to happen to a declared resource
pub fn classify(
    descriptor: &ResourceDescriptor,
    fingerprint: &str,
    prior: Option<&Snapshot>,
) -> Operation {
    match prior.and_then(|snapshot| snapshot.get(&descriptor.id)) {
        None => Operation::Create,
        Some(realized) if realized.kind == descriptor.kind && realized.fingerprint == fingerprint => {
            Operation::NoOp
        }
        Some(_) => Operation::Update,
    }
}

/// Counts of planned operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub no_op: usize,
    pub delete: usize,
}

impl PlanSummary {
    pub fn add(&mut self, operation: Operation) {
        match operation {
            Operation::Create => self.create += 1,
            Operation::Update => self.update += 1,
            Operation::NoOp => self.no_op += 1,
            Operation::Delete => self.delete += 1,
        }
    }

    /// Total number of changes
    pub fn changes(&self) -> usize {
        self.create + self.update + self.delete
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.changes() > 0
    }
}
