//! Core types for stack planning and execution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of a declared cloud resource
///
/// Kinds decide which arguments are meaningful, but argument names are not
/// validated here; that belongs to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    IamRole,
    IamRolePolicy,
    KmsKey,
    SnsTopic,
    SnsTopicPolicy,
    SnsTopicSubscription,
    SqsQueue,
    SqsQueuePolicy,
    CloudwatchEventRule,
    CloudwatchEventTarget,
    LambdaFunction,
    LambdaEventSourceMapping,
    LambdaPermission,
    /// Any kind not known to this crate, written as `custom:<name>`
    Custom(String),
}

impl ResourceKind {
    /// All built-in kinds
    pub const BUILTIN: [Self; 13] = [
        Self::IamRole,
        Self::IamRolePolicy,
        Self::KmsKey,
        Self::SnsTopic,
        Self::SnsTopicPolicy,
        Self::SnsTopicSubscription,
        Self::SqsQueue,
        Self::SqsQueuePolicy,
        Self::CloudwatchEventRule,
        Self::CloudwatchEventTarget,
        Self::LambdaFunction,
        Self::LambdaEventSourceMapping,
        Self::LambdaPermission,
    ];

    /// Stable snake_case name used in stack files and snapshots
    pub fn as_str(&self) -> &str {
        match self {
            Self::IamRole => "iam_role",
            Self::IamRolePolicy => "iam_role_policy",
            Self::KmsKey => "kms_key",
            Self::SnsTopic => "sns_topic",
            Self::SnsTopicPolicy => "sns_topic_policy",
            Self::SnsTopicSubscription => "sns_topic_subscription",
            Self::SqsQueue => "sqs_queue",
            Self::SqsQueuePolicy => "sqs_queue_policy",
            Self::CloudwatchEventRule => "cloudwatch_event_rule",
            Self::CloudwatchEventTarget => "cloudwatch_event_target",
            Self::LambdaFunction => "lambda_function",
            Self::LambdaEventSourceMapping => "lambda_event_source_mapping",
            Self::LambdaPermission => "lambda_permission",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Service prefix (`iam`, `sqs`, ...), used for target aliases
    pub fn service(&self) -> &str {
        match self {
            Self::Custom(_) => "custom",
            other => other.as_str().split('_').next().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(name) => write!(f, "custom:{name}"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("custom:") {
            if name.is_empty() {
                return Err("custom resource kind needs a name".to_string());
            }
            return Ok(Self::Custom(name.to_string()));
        }

        Self::BUILTIN
            .iter()
            .find(|kind| kind.as_str() == s)
            .cloned()
            .ok_or_else(|| format!("unknown resource kind: '{s}'"))
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.to_string()
    }
}

/// What the executor has to do with a planned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Not present in prior state
    Create,
    /// Present, but its declaration changed
    Update,
    /// Present and unchanged
    NoOp,
    /// Present in prior state, no longer declared
    Delete,
}

impl Operation {
    /// Check if this operation changes anything
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::NoOp => "no-op",
            Self::Delete => "delete",
        })
    }
}

/// Result of applying a single plan step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Retry behavior for provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 = no retry)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs within a phase
    pub jobs: usize,
    /// Retry policy for provider calls
    pub retry: RetryConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_strings() {
        for kind in ResourceKind::BUILTIN {
            assert_eq!(kind.to_string().parse::<ResourceKind>(), Ok(kind.clone()));
        }
        let custom: ResourceKind = "custom:s3_bucket".parse().unwrap();
        assert_eq!(custom, ResourceKind::Custom("s3_bucket".into()));
        assert_eq!(custom.to_string(), "custom:s3_bucket");
    }

    #[test]
    fn test_kind_rejects_unknown_names() {
        assert!("s3_bucket".parse::<ResourceKind>().is_err());
        assert!("custom:".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_service_prefix() {
        assert_eq!(ResourceKind::SqsQueuePolicy.service(), "sqs");
        assert_eq!(ResourceKind::CloudwatchEventRule.service(), "cloudwatch");
        assert_eq!(ResourceKind::Custom("x".into()).service(), "custom");
    }

    #[test]
    fn test_kind_serde_uses_snake_case_names() {
        let json = serde_json::to_string(&ResourceKind::LambdaEventSourceMapping).unwrap();
        assert_eq!(json, "\"lambda_event_source_mapping\"");
        let back: ResourceKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ResourceKind::LambdaEventSourceMapping);
    }

    #[test]
    fn test_operation_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&Operation::NoOp).unwrap(), "\"no-op\"");
        assert!(!Operation::NoOp.is_change());
        assert!(Operation::Delete.is_change());
    }

    #[test]
    fn test_summary_counts_results() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Modified);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.total_changes(), 2);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig::new(5, Duration::from_secs(10), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(30));
    }
}
