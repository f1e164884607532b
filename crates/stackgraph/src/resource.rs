//! Resource descriptors: the declared desired state of one cloud object.

use crate::types::ResourceKind;
use crate::value::{ArgumentValue, AttributeRef};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// A named, typed resource declaration
///
/// Arguments may reference attributes of other resources that do not
/// exist yet. Descriptors are immutable once registered with a
/// [`Stack`](crate::Stack).
///
/// # Example
///
/// ```
/// use stackgraph::{ArgumentValue, ResourceDescriptor, ResourceKind};
///
/// let queue = ResourceDescriptor::new("queue", ResourceKind::SqsQueue)
///     .with_arg("name", "orders")
///     .with_arg("redrive_policy", ArgumentValue::reference("dead-letter", "arn"));
///
/// assert_eq!(queue.dependency_ids().into_iter().collect::<Vec<_>>(), vec!["dead-letter"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    /// Unique within a stack
    pub id: String,
    pub kind: ResourceKind,
    pub arguments: BTreeMap<String, ArgumentValue>,
    /// Explicit ordering hints, in addition to argument references
    pub depends_on: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            arguments: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Set an argument, replacing any previous value
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Add an explicit dependency on another resource id
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments.get(name)
    }

    /// Every attribute reference, paired with the argument holding it
    ///
    /// Ordered by argument name, then by position inside the argument.
    pub fn references(&self) -> Vec<(&str, &AttributeRef)> {
        self.arguments
            .iter()
            .flat_map(|(name, value)| {
                value
                    .references()
                    .into_iter()
                    .map(move |r| (name.as_str(), r))
            })
            .collect()
    }

    /// Ids this resource depends on, through references or `depends_on`
    pub fn dependency_ids(&self) -> BTreeSet<&str> {
        self.references()
            .into_iter()
            .map(|(_, r)| r.resource.as_str())
            .chain(self.depends_on.iter().map(String::as_str))
            .collect()
    }

    /// Human-readable description, e.g. `sqs_queue queue`
    pub fn description(&self) -> String {
        format!("{} {}", self.kind, self.id)
    }

    /// Canonical JSON form: kind, arguments and dependencies
    pub fn canonical(&self) -> Value {
        let arguments: Map<String, Value> = self
            .arguments
            .iter()
            .map(|(name, value)| (name.clone(), value.canonical()))
            .collect();
        json!({
            "kind": self.kind.to_string(),
            "arguments": arguments,
            "depends_on": self.depends_on,
        })
    }
}
