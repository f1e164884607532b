//! Event fan-out pipeline
//!
//! A scheduled rule publishes to an encrypted topic, which fans out to an
//! email subscription, a queue with a dead-letter redrive, and a
//! container-image function with its own dead-letter queue. The wiring
//! patterns below are shared by every resource that needs them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stackgraph::{ArgumentValue, ResourceDescriptor, ResourceHandle, ResourceKind, Result, Stack};

/// Deployment image reference for the function
pub const IMAGE_URI: &str = "IMAGE_URI";
/// Notification email address for the email subscription
pub const MY_EMAIL_ADDRESS: &str = "MY_EMAIL_ADDRESS";
/// Account id interpolated into ARNs inside policy documents
pub const AWS_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";

/// Inputs the pipeline reads, with the environment variable each defaults to
pub const INPUTS: [&str; 3] = [IMAGE_URI, MY_EMAIL_ADDRESS, AWS_ACCOUNT_ID];

const POLICY_VERSION: &str = "2012-10-17";

/// Tunables for the pipeline, read from a stack file's `[fanout]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FanoutSettings {
    /// Prefix for every physical resource name
    pub prefix: String,
    pub region: String,
    /// Schedule expression for the timer rule
    pub schedule: String,
    pub retention_seconds: u64,
    pub visibility_timeout_seconds: u64,
    /// Receives before a message moves to the dead-letter queue
    pub max_receive_count: u64,
    /// Value of the topic's `Owner` tag
    pub owner: String,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            prefix: "stackplan-demo".to_string(),
            region: "ap-southeast-2".to_string(),
            schedule: "rate(5 minutes)".to_string(),
            retention_seconds: 7 * 24 * 60 * 60,
            visibility_timeout_seconds: 3000,
            max_receive_count: 10,
            owner: "awstraining".to_string(),
        }
    }
}

impl FanoutSettings {
    fn name(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.prefix)
    }

    fn arn(&self, service: &str, account: &str, name: &str) -> String {
        format!("arn:aws:{service}:{}:{account}:{name}", self.region)
    }
}

/// Declare the whole pipeline into `stack`
///
/// Fails with a `Configuration` error before declaring anything if one of
/// [`INPUTS`] is missing.
pub fn declare(stack: &mut Stack, settings: &FanoutSettings) -> Result<()> {
    let image_uri = stack.input_value(IMAGE_URI)?;
    let email = stack.input_value(MY_EMAIL_ADDRESS)?;
    let account = stack.input(AWS_ACCOUNT_ID)?.to_string();

    let queue_name = settings.name("sqs");
    let topic_name = settings.name("main-sns");
    let cmk_role_name = settings.name("cmk-role");

    // Encryption key and the role the schedule rule runs as
    let cmk_role = service_role(
        stack,
        "cmk-role",
        &cmk_role_name,
        "events.amazonaws.com",
        "role to use cmk",
    )?;

    let kms = stack.add(
        ResourceDescriptor::new("kms-key", ResourceKind::KmsKey)
            .with_arg("description", "cmk to protect sns & sqs")
            .with_arg(
                "policy",
                policy(json!({
                    "Version": POLICY_VERSION,
                    "Statement": [
                        {
                            "Effect": "Allow",
                            "Principal": { "AWS": "*" },
                            "Action": [
                                "kms:Decrypt",
                                "kms:GenerateDataKey*",
                                "kms:CreateGrant",
                                "kms:ListGrants",
                                "kms:DescribeKey"
                            ],
                            "Resource": "*",
                            "Condition": {
                                "ArnEquals": {
                                    "aws:SourceArn": [
                                        settings.arn("sqs", &account, &queue_name),
                                        settings.arn("sns", &account, &topic_name),
                                    ]
                                }
                            }
                        },
                        {
                            "Effect": "Allow",
                            "Principal": { "AWS": format!("arn:aws:iam::{account}:root") },
                            "Action": "kms:*",
                            "Resource": "*"
                        }
                    ]
                })),
            ),
    )?;

    role_policy(
        stack,
        "cmk-role-policy",
        &cmk_role,
        allow(
            json!([
                "kms:Decrypt",
                "kms:Encrypt",
                "kms:ReEncrypt",
                "kms:GenerateDataKey*",
                "kms:DescribeKey"
            ]),
            None,
            kms.attr("arn"),
        ),
    )?;

    let rule = stack.add(
        ResourceDescriptor::new("schedule-rule", ResourceKind::CloudwatchEventRule)
            .with_arg(
                "description",
                format!("Trigger {topic_name} on {}", settings.schedule),
            )
            .with_arg("schedule_expression", settings.schedule.as_str())
            .with_arg("role_arn", cmk_role.attr("arn")),
    )?;

    // Topic, its trigger and who may publish to it
    let topic = stack.add(
        ResourceDescriptor::new("main-topic", ResourceKind::SnsTopic)
            .with_arg("name", topic_name.as_str())
            .with_arg("kms_master_key_id", kms.attr("key_id"))
            .with_arg("tags", json!({ "Owner": settings.owner })),
    )?;

    stack.add(
        ResourceDescriptor::new("topic-target", ResourceKind::CloudwatchEventTarget)
            .with_arg("rule", rule.attr("name"))
            .with_arg("arn", topic.attr("arn")),
    )?;

    stack.add(
        ResourceDescriptor::new("topic-policy", ResourceKind::SnsTopicPolicy)
            .with_arg("arn", topic.attr("arn"))
            .with_arg(
                "policy",
                allow(
                    json!("sns:Publish"),
                    Some(json!({ "AWS": format!("arn:aws:iam::{account}:role/{cmk_role_name}") })),
                    topic.attr("arn"),
                ),
            ),
    )?;

    // Queue fed by the topic, redriving into a dead-letter queue
    let dead_letter = queue(stack, "dead-letter", &settings.name("sqs-dead-letter"), settings)?;
    let main_queue = stack.add(
        queue_descriptor("queue", &queue_name, settings).with_arg(
            "redrive_policy",
            ArgumentValue::json(
                json!({
                    "deadLetterTargetArn": "{0}",
                    "maxReceiveCount": settings.max_receive_count,
                }),
                vec![dead_letter.attr("arn")],
            ),
        ),
    )?;

    stack.add(
        ResourceDescriptor::new("queue-policy", ResourceKind::SqsQueuePolicy)
            .with_arg("queue_url", main_queue.attr("url"))
            .with_arg(
                "policy",
                allow(
                    json!("sqs:SendMessage"),
                    Some(json!({ "Service": "sns.amazonaws.com" })),
                    main_queue.attr("arn"),
                ),
            ),
    )?;

    // Function consuming the queue and the topic
    let lambda_dead_letter_name = settings.name("sqs-lambda-dead-letter");
    let lambda_role = service_role(
        stack,
        "lambda-role",
        &settings.name("lambda-exec-role"),
        "lambda.amazonaws.com",
        "lambda exec role",
    )?;

    let log_policy = role_policy(
        stack,
        "lambda-log-policy",
        &lambda_role,
        policy(json!({
            "Version": POLICY_VERSION,
            "Statement": [
                {
                    "Effect": "Allow",
                    "Action": [
                        "logs:CreateLogGroup",
                        "logs:CreateLogStream",
                        "logs:PutLogEvents"
                    ],
                    "Resource": "arn:aws:logs:*:*:*"
                },
                {
                    "Effect": "Allow",
                    "Action": [
                        "sqs:ReceiveMessage",
                        "sqs:DeleteMessage",
                        "sqs:GetQueueAttributes",
                        "sqs:GetQueueUrl",
                        "sqs:SendMessage"
                    ],
                    "Resource": [
                        settings.arn("sqs", &account, &queue_name),
                        settings.arn("sqs", &account, &lambda_dead_letter_name),
                    ]
                }
            ]
        })),
    )?;

    let lambda_dead_letter = queue(stack, "lambda-dead-letter", &lambda_dead_letter_name, settings)?;

    let function = stack.add(
        ResourceDescriptor::new("function", ResourceKind::LambdaFunction)
            .with_arg("name", settings.name("lambda-function"))
            .with_arg("role", lambda_role.attr("arn"))
            .with_arg("package_type", "Image")
            .with_arg("image_uri", image_uri)
            .with_arg(
                "dead_letter_config",
                ArgumentValue::document(
                    json!({ "target_arn": "{0}" }),
                    vec![lambda_dead_letter.attr("arn")],
                ),
            )
            .with_dependency(log_policy.id()),
    )?;

    stack.add(
        ResourceDescriptor::new("queue-event-source", ResourceKind::LambdaEventSourceMapping)
            .with_arg("event_source_arn", main_queue.attr("arn"))
            .with_arg("function_name", function.attr("name")),
    )?;

    stack.add(
        ResourceDescriptor::new("topic-permission", ResourceKind::LambdaPermission)
            .with_arg("action", "lambda:InvokeFunction")
            .with_arg("function", function.attr("name"))
            .with_arg("principal", "sns.amazonaws.com")
            .with_arg("source_arn", topic.attr("arn")),
    )?;

    // Fan-out
    subscription(stack, "email-subscription", &topic, "email", email)?;
    subscription(stack, "lambda-subscription", &topic, "lambda", function.attr("arn"))?;
    subscription(stack, "queue-subscription", &topic, "sqs", main_queue.attr("arn"))?;

    log::debug!("Declared fan-out pipeline with prefix '{}'", settings.prefix);
    Ok(())
}

/// A policy document, rendered to its JSON string
fn policy(document: Value) -> ArgumentValue {
    ArgumentValue::json(document, Vec::new())
}

/// Single-statement allow policy over one resource known only at apply time
fn allow(actions: Value, principal: Option<Value>, resource: ArgumentValue) -> ArgumentValue {
    let mut statement = json!({
        "Effect": "Allow",
        "Action": actions,
        "Resource": "{0}",
    });
    if let Some(principal) = principal {
        statement["Principal"] = principal;
    }
    ArgumentValue::json(
        json!({ "Version": POLICY_VERSION, "Statement": [statement] }),
        vec![resource],
    )
}

/// IAM role assumable by one AWS service
fn service_role(
    stack: &mut Stack,
    id: &str,
    name: &str,
    service: &str,
    description: &str,
) -> Result<ResourceHandle> {
    stack.add(
        ResourceDescriptor::new(id, ResourceKind::IamRole)
            .with_arg("name", name)
            .with_arg("description", description)
            .with_arg(
                "assume_role_policy",
                policy(json!({
                    "Version": POLICY_VERSION,
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": service },
                        "Action": "sts:AssumeRole"
                    }]
                })),
            ),
    )
}

fn role_policy(
    stack: &mut Stack,
    id: &str,
    role: &ResourceHandle,
    policy: ArgumentValue,
) -> Result<ResourceHandle> {
    stack.add(
        ResourceDescriptor::new(id, ResourceKind::IamRolePolicy)
            .with_arg("role", role.attr("name"))
            .with_arg("policy", policy),
    )
}

fn queue_descriptor(id: &str, name: &str, settings: &FanoutSettings) -> ResourceDescriptor {
    ResourceDescriptor::new(id, ResourceKind::SqsQueue)
        .with_arg("name", name)
        .with_arg("message_retention_seconds", settings.retention_seconds)
        .with_arg(
            "visibility_timeout_seconds",
            settings.visibility_timeout_seconds,
        )
}

fn queue(
    stack: &mut Stack,
    id: &str,
    name: &str,
    settings: &FanoutSettings,
) -> Result<ResourceHandle> {
    stack.add(queue_descriptor(id, name, settings))
}

fn subscription(
    stack: &mut Stack,
    id: &str,
    topic: &ResourceHandle,
    protocol: &str,
    endpoint: ArgumentValue,
) -> Result<ResourceHandle> {
    stack.add(
        ResourceDescriptor::new(id, ResourceKind::SnsTopicSubscription)
            .with_arg("topic", topic.attr("arn"))
            .with_arg("protocol", protocol)
            .with_arg("endpoint", endpoint),
    )
}
