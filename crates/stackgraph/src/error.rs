//! Error types for stack planning and execution.
//!
//! Planning errors (`Configuration`, `UnknownReference`, `CyclicDependency`,
//! `DuplicateResource`) are raised before any provider is touched and are
//! always terminal: no partial plan is returned. The remaining variants
//! surface while a plan is being executed.

use thiserror::Error;

/// Errors that can occur while declaring, planning or executing a stack.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input value was not provided
    #[error("missing required input '{name}': {hint}")]
    Configuration {
        /// Name of the input
        name: String,
        /// Where the value was expected to come from
        hint: String,
    },

    /// A reference points at a resource id that was never declared
    #[error("resource '{resource}' references unknown resource '{target}' (in '{argument}')")]
    UnknownReference {
        /// The referencing resource
        resource: String,
        /// Argument (or `depends_on`) holding the reference
        argument: String,
        /// The id that could not be found
        target: String,
    },

    /// The dependency graph contains a cycle
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Full cycle path, first node repeated at the end
        cycle: Vec<String>,
    },

    /// Two resources were declared with the same id
    #[error("duplicate resource id: {0}")]
    DuplicateResource(String),

    /// An attribute was needed before its resource was realized
    #[error("attribute '{resource}.{attribute}' is not available")]
    UnresolvedAttribute {
        /// Resource that should expose the attribute
        resource: String,
        /// Attribute name
        attribute: String,
    },

    /// A computed value could not be produced from its inputs
    #[error("transform '{transform}' failed: {message}")]
    Transform {
        /// Transform display name
        transform: String,
        /// What went wrong
        message: String,
    },

    /// The provider failed to realize or delete a resource
    #[error("provider error for '{resource}': {message}")]
    Provider {
        /// Resource being applied
        resource: String,
        /// Provider message
        message: String,
        /// Whether retrying may succeed
        retryable: bool,
    },

    /// The executor could not be set up
    #[error("executor error: {0}")]
    Executor(String),

    /// Asking the user for confirmation failed
    #[error("confirmation failed: {0}")]
    Interaction(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { retryable: true, .. })
    }

    /// Whether this error is detected during planning, before any external effect.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::UnknownReference { .. }
                | Self::CyclicDependency { .. }
                | Self::DuplicateResource(_)
        )
    }

    /// Build a `Configuration` error for a named input.
    pub fn missing_input(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Configuration {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

/// Result type for stackgraph operations.
pub type Result<T> = std::result::Result<T, Error>;
