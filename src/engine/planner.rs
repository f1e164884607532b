//! Loading a stack file and its state into a plan

use anyhow::Result;
use stackgraph::{ExecutionPlan, Snapshot, Stack};
use std::path::PathBuf;

use crate::config::{StackFile, expand_path};
use crate::fanout::AWS_ACCOUNT_ID;
use crate::provider::{DEFAULT_ACCOUNT_ID, DEFAULT_REGION, SimulatedProvider};
use crate::state::StateFile;

/// A stack file resolved against the environment and the last saved state
pub struct LoadedStack {
    pub file: StackFile,
    pub stack: Stack,
    pub prior: Option<Snapshot>,
    pub state_path: PathBuf,
}

impl LoadedStack {
    /// Load `stack_path` and the state at `state_path`
    pub fn load(stack_path: &str, state_path: &str) -> Result<Self> {
        Self::load_with_env(stack_path, state_path, |name| std::env::var(name).ok())
    }

    pub fn load_with_env<F>(stack_path: &str, state_path: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = StackFile::load(&expand_path(stack_path))?;
        let stack = file.build(env)?;
        let state_path = expand_path(state_path);
        let prior = StateFile::load_snapshot(&state_path, stack.name())?;

        Ok(Self {
            file,
            stack,
            prior,
            state_path,
        })
    }

    /// Plan against the saved state, optionally narrowed to `target`
    pub fn plan(&self, target: Option<&str>) -> Result<ExecutionPlan> {
        let plan = self.stack.plan(self.prior.as_ref())?;
        Ok(plan.filter_by_target(target))
    }

    pub fn account_id(&self) -> String {
        self.stack
            .input(AWS_ACCOUNT_ID)
            .map_or_else(|_| DEFAULT_ACCOUNT_ID.to_string(), str::to_string)
    }

    pub fn region(&self) -> String {
        self.file
            .fanout
            .as_ref()
            .map_or_else(|| DEFAULT_REGION.to_string(), |f| f.region.clone())
    }

    /// Provider for this stack's account and region
    pub fn provider<I, S>(&self, failing: I) -> SimulatedProvider
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SimulatedProvider::new(self.account_id(), self.region()).failing(failing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use stackgraph::Operation;

    const STACK: &str = r#"
[stack]
name = "orders"

[inputs]
AWS_ACCOUNT_ID = "123456789012"

[[resource]]
id = "dead-letter"
kind = "sqs_queue"

[[resource]]
id = "queue"
kind = "sqs_queue"
[resource.args]
dlq = { ref = "dead-letter.arn" }
"#;

    fn load(dir: &tempfile::TempDir) -> LoadedStack {
        let stack_path = dir.path().join("stack.toml");
        fs::write(&stack_path, STACK).unwrap();
        let state_path = dir.path().join("state.json");
        LoadedStack::load_with_env(
            stack_path.to_str().unwrap(),
            state_path.to_str().unwrap(),
            |_| None,
        )
        .unwrap()
    }

    #[test]
    fn test_load_and_plan() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir);

        assert!(loaded.prior.is_none());
        assert_eq!(loaded.account_id(), "123456789012");
        assert_eq!(loaded.region(), DEFAULT_REGION);

        let plan = loaded.plan(None).unwrap();
        assert_eq!(plan.order(), vec!["dead-letter", "queue"]);
        assert!(plan.steps.iter().all(|s| s.operation == Operation::Create));
    }

    #[test]
    fn test_plan_uses_saved_state() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir);

        let plan = loaded.plan(None).unwrap();
        let outcome = stackgraph::execute(
            &plan,
            None,
            &loaded.provider(Vec::<String>::new()),
            &stackgraph::ExecuteOptions::default(),
            &mut stackgraph::NoProgress,
            &mut stackgraph::AutoConfirm,
        )
        .unwrap();
        StateFile::new("orders", outcome.snapshot)
            .save(&loaded.state_path)
            .unwrap();

        let reloaded = load(&dir);
        assert!(reloaded.prior.is_some());
        assert!(!reloaded.plan(None).unwrap().has_changes());
    }

    #[test]
    fn test_target_narrows_plan() {
        let dir = tempfile::tempdir().unwrap();
        let plan = load(&dir).plan(Some("dead-letter")).unwrap();
        assert_eq!(plan.order(), vec!["dead-letter"]);
    }

    #[test]
    fn test_missing_stack_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let result = LoadedStack::load(missing.to_str().unwrap(), "state.json");
        assert!(result.is_err());
    }
}
