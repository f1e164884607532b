//! Stack files: TOML declarations turned into a [`Stack`]
//!
//! ```toml
//! [stack]
//! name = "orders"
//!
//! [inputs]
//! IMAGE_URI = { env = "IMAGE_URI" }
//! AWS_ACCOUNT_ID = "123456789012"
//!
//! [fanout]
//! prefix = "orders"
//!
//! [[resource]]
//! id = "audit-queue"
//! kind = "sqs_queue"
//! depends_on = ["queue"]
//! [resource.args]
//! name = "orders-audit"
//! policy = { json = { Resource = "{0}" }, args = [{ ref = "queue.arn" }] }
//! ```

use crate::fanout::{self, FanoutSettings};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use stackgraph::{ArgumentValue, AttributeRef, ResourceDescriptor, ResourceKind, Stack};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default stack file name, looked up in the working directory
pub const DEFAULT_STACK_FILE: &str = "stack.toml";

/// Default location of the state snapshot
pub const DEFAULT_STATE_FILE: &str = ".stackplan/state.json";

const ID_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_-]*$";
const REF_PATTERN: &str = r"^([A-Za-z][A-Za-z0-9_-]*)\.([A-Za-z_][A-Za-z0-9_]*)$";

/// Structural problems in a stack file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid resource id '{0}': ids must match {ID_PATTERN}")]
    InvalidId(String),

    #[error("resource '{resource}', argument '{argument}': {message}")]
    InvalidArgument {
        resource: String,
        argument: String,
        message: String,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Top-level stack file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    pub stack: StackMeta,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputSpec>,
    /// Declares the fan-out pipeline when present
    #[serde(default)]
    pub fanout: Option<FanoutSettings>,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Where an input value comes from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    Literal(String),
    Env(EnvSource),
}

/// `{ env = "NAME", default = "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvSource {
    pub env: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// One `[[resource]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub args: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StackFile {
    /// Read and parse a stack file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read stack file: {}", path.display()))?;
        let file = Self::parse(&content)
            .with_context(|| format!("Failed to parse stack file: {}", path.display()))?;
        log::debug!(
            "Loaded stack '{}' from {} ({} resources)",
            file.stack.name,
            path.display(),
            file.resources.len()
        );
        Ok(file)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build a stack, reading environment inputs through `env`
    ///
    /// Inputs the fan-out pipeline needs but the file doesn't list are read
    /// from the environment variable of the same name. Missing inputs are
    /// only an error once something uses them.
    pub fn build<F>(&self, env: F) -> Result<Stack>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut stack = Stack::new(self.stack.name.clone());

        for (name, spec) in &self.inputs {
            let value = match spec {
                InputSpec::Literal(value) => Some(value.clone()),
                InputSpec::Env(source) => env(&source.env).or_else(|| source.default.clone()),
            };
            if let Some(value) = value {
                stack.set_input(name.clone(), value);
            }
        }

        if let Some(settings) = &self.fanout {
            for name in fanout::INPUTS {
                if !self.inputs.contains_key(name)
                    && let Some(value) = env(name)
                {
                    stack.set_input(name, value);
                }
            }
            fanout::declare(&mut stack, settings)?;
        }

        let converter = ArgumentConverter::new()?;
        for entry in &self.resources {
            let descriptor = converter.descriptor(entry, &stack)?;
            stack.add(descriptor)?;
        }

        Ok(stack)
    }
}

/// Resolve a user-supplied path, expanding `~` and environment variables
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).map_or_else(|_| path.into(), |p| p.into_owned());
    PathBuf::from(expanded)
}

/// Turns `[resource.args]` values into argument values
struct ArgumentConverter {
    id_pattern: Regex,
    ref_pattern: Regex,
}

impl ArgumentConverter {
    fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            id_pattern: Regex::new(ID_PATTERN)?,
            ref_pattern: Regex::new(REF_PATTERN)?,
        })
    }

    fn descriptor(&self, entry: &ResourceEntry, stack: &Stack) -> Result<ResourceDescriptor> {
        if !self.id_pattern.is_match(&entry.id) {
            return Err(ConfigError::InvalidId(entry.id.clone()).into());
        }

        let mut descriptor = ResourceDescriptor::new(entry.id.clone(), entry.kind.clone());
        for (name, value) in &entry.args {
            let converted = self
                .convert(value, stack)
                .map_err(|failure| match failure {
                    Conversion::Invalid(message) => anyhow::Error::from(ConfigError::InvalidArgument {
                        resource: entry.id.clone(),
                        argument: name.clone(),
                        message,
                    }),
                    Conversion::Stack(e) => anyhow::Error::from(e),
                })?;
            descriptor = descriptor.with_arg(name.clone(), converted);
        }
        for dependency in &entry.depends_on {
            descriptor = descriptor.with_dependency(dependency.clone());
        }
        Ok(descriptor)
    }

    fn convert(&self, value: &toml::Value, stack: &Stack) -> Result<ArgumentValue, Conversion> {
        let Some(table) = value.as_table() else {
            return Ok(ArgumentValue::Literal(to_json(value)?));
        };

        if let Some(target) = table.get("ref") {
            expect_keys(table, &["ref"])?;
            let target = target
                .as_str()
                .ok_or_else(|| Conversion::invalid("'ref' must be a string"))?;
            if !self.ref_pattern.is_match(target) {
                return Err(Conversion::invalid(format!(
                    "invalid reference '{target}', expected 'resource.attribute'"
                )));
            }
            let reference: AttributeRef = target.parse().map_err(Conversion::Invalid)?;
            return Ok(reference.into());
        }

        if let Some(name) = table.get("input") {
            expect_keys(table, &["input"])?;
            let name = name
                .as_str()
                .ok_or_else(|| Conversion::invalid("'input' must be a string"))?;
            return stack.input_value(name).map_err(Conversion::Stack);
        }

        if let Some(template) = table.get("template") {
            expect_keys(table, &["template", "args"])?;
            let template = template
                .as_str()
                .ok_or_else(|| Conversion::invalid("'template' must be a string"))?;
            return Ok(ArgumentValue::template(template, self.args(table, stack)?));
        }

        if let Some(document) = table.get("json") {
            expect_keys(table, &["json", "args"])?;
            return Ok(ArgumentValue::json(to_json(document)?, self.args(table, stack)?));
        }

        if let Some(document) = table.get("document") {
            expect_keys(table, &["document", "args"])?;
            return Ok(ArgumentValue::document(to_json(document)?, self.args(table, stack)?));
        }

        if let Some(separator) = table.get("join") {
            expect_keys(table, &["join", "args"])?;
            let separator = separator
                .as_str()
                .ok_or_else(|| Conversion::invalid("'join' must be a string"))?;
            return Ok(ArgumentValue::join(separator, self.args(table, stack)?));
        }

        Ok(ArgumentValue::Literal(to_json(value)?))
    }

    fn args(&self, table: &toml::Table, stack: &Stack) -> Result<Vec<ArgumentValue>, Conversion> {
        match table.get("args") {
            None => Ok(Vec::new()),
            Some(toml::Value::Array(items)) => {
                items.iter().map(|item| self.convert(item, stack)).collect()
            }
            Some(_) => Err(Conversion::invalid("'args' must be an array")),
        }
    }
}

/// Why an argument could not be converted
enum Conversion {
    Invalid(String),
    Stack(stackgraph::Error),
}

impl Conversion {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

fn expect_keys(table: &toml::Table, allowed: &[&str]) -> Result<(), Conversion> {
    match table.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(Conversion::invalid(format!(
            "unexpected key '{key}' next to '{}'",
            allowed[0]
        ))),
        None => Ok(()),
    }
}

fn to_json(value: &toml::Value) -> Result<Value, Conversion> {
    serde_json::to_value(value).map_err(|e| Conversion::invalid(e.to_string()))
}
