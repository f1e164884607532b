//! # Stackgraph
//!
//! Declare cloud resources that reference each other, resolve the
//! dependencies between them and turn the result into an ordered plan.
//!
//! ## Core Concepts
//!
//! - **ResourceDescriptor**: A named, typed resource with arguments
//! - **ArgumentValue**: A literal, a reference to another resource's
//!   attribute, or a value computed from other values
//! - **DependencyGraph**: Edges from each resource to the ones that read it
//! - **ExecutionPlan**: Resources in an order where every dependency comes
//!   first, grouped into phases that can run concurrently
//! - **Executor**: Applies a plan through a [`Provider`]
//!
//! ## Example
//!
//! ```
//! use stackgraph::{ArgumentValue, ResourceDescriptor, ResourceKind, Stack};
//! use serde_json::json;
//!
//! let mut stack = Stack::new("fanout");
//! let dlq = stack.add(ResourceDescriptor::new("dead-letter", ResourceKind::SqsQueue))?;
//! let topic = stack.add(ResourceDescriptor::new("topic", ResourceKind::SnsTopic))?;
//! stack.add(
//!     ResourceDescriptor::new("queue", ResourceKind::SqsQueue).with_arg(
//!         "redrive_policy",
//!         ArgumentValue::json(
//!             json!({"deadLetterTargetArn": "{0}", "maxReceiveCount": 10}),
//!             vec![dlq.attr("arn")],
//!         ),
//!     ),
//! )?;
//! stack.add(
//!     ResourceDescriptor::new("subscription", ResourceKind::SnsTopicSubscription)
//!         .with_arg("topic_arn", topic.attr("arn"))
//!         .with_arg("endpoint", ArgumentValue::reference("queue", "arn")),
//! )?;
//!
//! let plan = stack.plan(None)?;
//! assert_eq!(plan.order(), vec!["dead-letter", "topic", "queue", "subscription"]);
//! # Ok::<(), stackgraph::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`Provider`]: Creates, updates and deletes resources
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod resolver;
pub mod resource;
pub mod retry;
pub mod snapshot;
pub mod stack;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use context::{
    ApplyRequest, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, Provider,
};
pub use diff::{PlanSummary, classify, fingerprint};
pub use error::{Error, Result};
pub use executor::{ExecuteOutcome, execute};
pub use planner::{ExecutionPlan, PlanStep, PlannedDeletion, build_plan, plan};
pub use resolver::{DependencyGraph, resolve};
pub use resource::ResourceDescriptor;
pub use retry::{RetryCallback, with_retry};
pub use snapshot::{RealizedResource, Snapshot};
pub use stack::{ResourceHandle, Stack};
pub use types::{
    ApplyResult, ExecuteOptions, ExecuteSummary, Operation, ResourceKind, RetryConfig,
};
pub use value::{
    ArgumentValue, AttributeRef, AttributeStore, Attributes, Computed, CustomTransform, Transform,
    value_to_text,
};
