//! Declaration surface: register resources and wire them together

use crate::error::{Error, Result};
use crate::planner::{ExecutionPlan, build_plan};
use crate::resolver::{DependencyGraph, resolve};
use crate::resource::ResourceDescriptor;
use crate::snapshot::Snapshot;
use crate::types::ResourceKind;
use crate::value::{ArgumentValue, AttributeRef};
use std::collections::{BTreeMap, HashMap};

/// Handle to a registered resource, used to reference its future attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    id: String,
    kind: ResourceKind,
}

impl ResourceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Reference to an attribute this resource will expose once realized
    pub fn attr(&self, name: &str) -> ArgumentValue {
        ArgumentValue::Reference(self.attr_ref(name))
    }

    pub fn attr_ref(&self, name: &str) -> AttributeRef {
        AttributeRef::new(self.id.clone(), name)
    }
}

/// An ordered collection of resource declarations plus named inputs
///
/// Declaration order is kept; it breaks ties when ordering the plan.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    descriptors: Vec<ResourceDescriptor>,
    index: HashMap<String, usize>,
    inputs: BTreeMap<String, String>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a descriptor
    ///
    /// Arguments may reference resources declared later; references are
    /// only checked when the stack is resolved.
    pub fn add(&mut self, descriptor: ResourceDescriptor) -> Result<ResourceHandle> {
        if self.index.contains_key(&descriptor.id) {
            return Err(Error::DuplicateResource(descriptor.id));
        }
        let handle = ResourceHandle {
            id: descriptor.id.clone(),
            kind: descriptor.kind.clone(),
        };
        self.index
            .insert(descriptor.id.clone(), self.descriptors.len());
        log::trace!("Declared {}", descriptor.description());
        self.descriptors.push(descriptor);
        Ok(handle)
    }

    /// Provide a named input value
    pub fn set_input(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inputs.insert(name.into(), value.into());
    }

    /// Look up a required input
    ///
    /// Fails with a `Configuration` error naming the input if it was never
    /// set or is empty.
    pub fn input(&self, name: &str) -> Result<&str> {
        match self.inputs.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::missing_input(
                name,
                format!("set the {name} input before planning"),
            )),
        }
    }

    /// A required input as a literal argument value
    pub fn input_value(&self, name: &str) -> Result<ArgumentValue> {
        self.input(name).map(ArgumentValue::from)
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Build the dependency graph, validating every reference
    pub fn resolve(&self) -> Result<DependencyGraph> {
        resolve(&self.descriptors)
    }

    /// Resolve and order the stack against optional prior state
    pub fn plan(&self, prior: Option<&Snapshot>) -> Result<ExecutionPlan> {
        let graph = self.resolve()?;
        let plan = build_plan(&graph, &self.descriptors, prior)?;
        log::debug!(
            "Planned stack '{}': {} steps, {} deletions",
            self.name,
            plan.steps.len(),
            plan.deletions.len()
        );
        Ok(plan)
    }
}
