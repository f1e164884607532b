//! Example stack file for the fan-out pipeline

use anyhow::{Context as _, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::TemplateArgs;
use crate::fanout::{self, FanoutSettings};

#[derive(Serialize)]
struct Template<'a> {
    stack: Meta<'a>,
    inputs: BTreeMap<&'a str, EnvInput<'a>>,
    fanout: &'a FanoutSettings,
}

#[derive(Serialize)]
struct Meta<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct EnvInput<'a> {
    env: &'a str,
}

pub fn run(_ctx: &Context, args: &TemplateArgs) -> Result<()> {
    print!("{}", render(args.prefix.as_deref(), args.region.as_deref())?);
    Ok(())
}

/// Render a stack file declaring the pipeline with inputs read from the environment
pub fn render(prefix: Option<&str>, region: Option<&str>) -> Result<String> {
    let mut settings = FanoutSettings::default();
    if let Some(prefix) = prefix {
        settings.prefix = prefix.to_string();
    }
    if let Some(region) = region {
        settings.region = region.to_string();
    }

    let template = Template {
        stack: Meta {
            name: &settings.prefix,
            description: "Scheduled fan-out: rule -> topic -> queue -> function",
        },
        inputs: fanout::INPUTS
            .into_iter()
            .map(|name| (name, EnvInput { env: name }))
            .collect(),
        fanout: &settings,
    };

    let body = toml::to_string_pretty(&template).context("Failed to render stack template")?;
    Ok(format!(
        "# Generated by stackplan. Export {} before planning.\n\n{body}",
        fanout::INPUTS.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvSource, InputSpec, StackFile};

    #[test]
    fn test_template_parses_back() {
        let text = render(Some("orders"), None).unwrap();
        let file = StackFile::parse(&text).unwrap();

        assert_eq!(file.stack.name, "orders");
        assert_eq!(file.fanout.as_ref().unwrap().prefix, "orders");
        assert_eq!(
            file.inputs["IMAGE_URI"],
            InputSpec::Env(EnvSource {
                env: "IMAGE_URI".to_string(),
                default: None
            })
        );
    }

    #[test]
    fn test_template_builds_full_pipeline() {
        let text = render(None, Some("us-east-1")).unwrap();
        let file = StackFile::parse(&text).unwrap();
        let stack = file
            .build(|name| match name {
                "IMAGE_URI" => Some("123.dkr.ecr/app:latest".to_string()),
                "MY_EMAIL_ADDRESS" => Some("ops@example.com".to_string()),
                "AWS_ACCOUNT_ID" => Some("123456789012".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(stack.len(), 19);
        assert_eq!(file.fanout.unwrap().region, "us-east-1");
    }

    #[test]
    fn test_template_without_environment_fails_on_inputs() {
        let text = render(None, None).unwrap();
        let file = StackFile::parse(&text).unwrap();
        let err = file.build(|_| None).unwrap_err();
        assert!(err.to_string().contains("IMAGE_URI"));
    }
}
