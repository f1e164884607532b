//! Provider and callback traits
//!
//! These traits keep the engine independent of any particular cloud API,
//! terminal UI or prompt library.

use crate::error::Result;
use crate::types::{ApplyResult, ResourceKind};
use crate::value::Attributes;
use serde_json::Value;
use std::collections::BTreeMap;

/// A fully resolved request for the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest<'a> {
    pub id: &'a str,
    pub kind: &'a ResourceKind,
    /// Every argument with references and transforms already resolved
    pub arguments: &'a BTreeMap<String, Value>,
}

/// Something that can realize resources
///
/// Called from worker threads, one call per resource; calls for resources
/// in the same phase may run concurrently.
pub trait Provider: Send + Sync {
    /// Create a resource and return the attributes it exposes
    fn create(&self, request: &ApplyRequest<'_>) -> Result<Attributes>;

    /// Update an existing resource in place
    ///
    /// `current` holds the attributes recorded when it was last realized.
    fn update(&self, request: &ApplyRequest<'_>, current: &Attributes) -> Result<Attributes>;

    /// Delete a resource that is no longer declared
    fn delete(&self, id: &str, kind: &ResourceKind, current: &Attributes) -> Result<()>;
}

/// Progress callback for execution
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when a phase of independent resources starts
    fn on_phase_start(&mut self, phase: usize, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, description: &str);

    /// Called when a resource application completes
    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult);

    /// Called when a phase completes
    fn on_phase_complete(&mut self, phase: usize);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// Returns `true` if the user confirmed.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&mut self, _phase: usize, _count: usize) {}
    fn on_resource_start(&mut self, _id: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &str, _result: &ApplyResult) {}
    fn on_phase_complete(&mut self, _phase: usize) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
