//! Offline provider that fabricates realistic attributes
//!
//! Identifiers are derived from a BLAKE3 hash of the resource id, so two
//! applies of the same stack produce the same ARNs and URLs.

use serde_json::Value;
use stackgraph::{ApplyRequest, Attributes, Error, Provider, ResourceKind, Result};
use std::collections::HashSet;

/// Account id used when a stack doesn't provide one
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

/// Region used when a stack doesn't provide one
pub const DEFAULT_REGION: &str = "ap-southeast-2";

pub struct SimulatedProvider {
    account_id: String,
    region: String,
    /// Resource ids whose calls fail
    fail_on: HashSet<String>,
}

impl SimulatedProvider {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            fail_on: HashSet::new(),
        }
    }

    /// Make every call for these resource ids fail
    pub fn failing<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_on.extend(ids.into_iter().map(Into::into));
        self
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.fail_on.contains(id) {
            return Err(Error::Provider {
                resource: id.to_string(),
                message: "simulated failure".to_string(),
                retryable: false,
            });
        }
        Ok(())
    }

    fn attributes(&self, request: &ApplyRequest<'_>) -> Attributes {
        let id = request.id;
        let name = request
            .arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        let account = &self.account_id;
        let region = &self.region;
        let unique = unique_id(id);

        let mut attributes = Attributes::new();
        let mut set = |key: &str, value: String| {
            attributes.insert(key.to_string(), Value::String(value));
        };

        match request.kind {
            ResourceKind::IamRole => {
                set("arn", format!("arn:aws:iam::{account}:role/{name}"));
                set("name", name);
                set("unique_id", format!("AROA{}", &hash(id)[..16].to_uppercase()));
            }
            ResourceKind::IamRolePolicy => {
                let role = request
                    .arguments
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("role");
                set("id", format!("{role}:{id}"));
                set("name", name);
            }
            ResourceKind::KmsKey => {
                set("arn", format!("arn:aws:kms:{region}:{account}:key/{unique}"));
                set("key_id", unique);
            }
            ResourceKind::SqsQueue => {
                set("arn", format!("arn:aws:sqs:{region}:{account}:{name}"));
                set(
                    "url",
                    format!("https://sqs.{region}.amazonaws.com/{account}/{name}"),
                );
                set("name", name);
            }
            ResourceKind::SnsTopic => {
                set("arn", format!("arn:aws:sns:{region}:{account}:{name}"));
                set("name", name);
            }
            ResourceKind::SnsTopicSubscription => {
                let topic = request
                    .arguments
                    .get("topic")
                    .and_then(Value::as_str)
                    .unwrap_or("topic");
                set("arn", format!("{topic}:{unique}"));
            }
            ResourceKind::CloudwatchEventRule => {
                set("arn", format!("arn:aws:events:{region}:{account}:rule/{name}"));
                set("name", name);
            }
            ResourceKind::LambdaFunction => {
                set(
                    "arn",
                    format!("arn:aws:lambda:{region}:{account}:function:{name}"),
                );
                set("name", name);
                set("version", "$LATEST".to_string());
            }
            ResourceKind::LambdaEventSourceMapping => {
                set("uuid", unique.clone());
            }
            ResourceKind::SnsTopicPolicy
            | ResourceKind::SqsQueuePolicy
            | ResourceKind::CloudwatchEventTarget
            | ResourceKind::LambdaPermission
            | ResourceKind::Custom(_) => {}
        }

        attributes
            .entry("id".to_string())
            .or_insert_with(|| Value::String(unique_id(id)));
        attributes
    }
}

impl Provider for SimulatedProvider {
    fn create(&self, request: &ApplyRequest<'_>) -> Result<Attributes> {
        self.check(request.id)?;
        log::info!("Creating {} {}", request.kind, request.id);
        Ok(self.attributes(request))
    }

    fn update(&self, request: &ApplyRequest<'_>, current: &Attributes) -> Result<Attributes> {
        self.check(request.id)?;
        log::info!("Updating {} {}", request.kind, request.id);

        // Server-assigned identifiers survive an in-place update
        let mut attributes = self.attributes(request);
        for key in ["id", "key_id", "unique_id", "uuid"] {
            if let Some(value) = current.get(key) {
                attributes.insert(key.to_string(), value.clone());
            }
        }
        Ok(attributes)
    }

    fn delete(&self, id: &str, kind: &ResourceKind, _current: &Attributes) -> Result<()> {
        self.check(id)?;
        log::info!("Deleting {kind} {id}");
        Ok(())
    }
}

fn hash(id: &str) -> String {
    blake3::hash(id.as_bytes()).to_hex().to_string()
}

/// UUID-shaped identifier derived from the resource id
fn unique_id(id: &str) -> String {
    let h = hash(id);
    format!(
        "{}-{}-{}-{}-{}",
        &h[..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}
