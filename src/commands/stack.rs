//! Stack commands
//!
//! - `plan` - Show what apply would change
//! - `apply` - Realize the stack and save its state
//! - `graph` - Print the dependency graph
//! - `validate` - Check references and cycles without planning

use anyhow::{Result, bail};
use colored::Colorize;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::{ApplyArgs, GraphArgs, GraphFormat, PlanArgs, StackArgs};
use crate::engine::{self, ApplyOptions, LoadedStack, differ};
use crate::state::StateFile;
use crate::ui;

pub fn plan(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let loaded = LoadedStack::load(&args.stack.file, &args.stack.state)?;
    let plan = loaded.plan(args.target.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan.to_json())?);
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Plan for stack '{}'", loaded.stack.name()));
        if loaded.prior.is_none() {
            ui::dim("No saved state, every resource is new");
        }
    }
    differ::display_plan(&plan, loaded.prior.as_ref(), ctx.verbose > 0);
    Ok(())
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let loaded = LoadedStack::load(&args.stack.file, &args.stack.state)?;
    let plan = loaded.plan(args.target.as_deref())?;

    if !ctx.quiet {
        ui::header(&format!("Applying stack '{}'", loaded.stack.name()));
        if args.dry_run {
            ui::warn("Dry run - no changes will be made");
        }
    }
    differ::display_plan(&plan, loaded.prior.as_ref(), ctx.verbose > 0);

    if !plan.has_changes() {
        return Ok(());
    }

    let provider = loaded.provider(args.fail.iter().cloned());
    let opts = ApplyOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
        yes: args.yes,
        quiet: ctx.quiet,
    };
    let outcome = engine::execute(&plan, loaded.prior.as_ref(), &provider, &opts)?;

    if !args.dry_run && outcome.summary.total_changes() > 0 {
        StateFile::new(loaded.stack.name(), outcome.snapshot).save(&loaded.state_path)?;
        if !ctx.quiet {
            ui::kv("State", &loaded.state_path.display().to_string());
        }
    }

    if outcome.summary.failed > 0 {
        bail!("{} resources failed to apply", outcome.summary.failed);
    }
    Ok(())
}

pub fn graph(_ctx: &Context, args: &GraphArgs) -> Result<()> {
    let loaded = LoadedStack::load(&args.stack.file, &args.stack.state)?;
    let graph = loaded.stack.resolve()?;

    let rendered = match args.format {
        GraphFormat::Text => differ::render_graph_text(&loaded.stack, &graph),
        GraphFormat::Dot => differ::render_graph_dot(&loaded.stack, &graph),
    };
    print!("{rendered}");
    Ok(())
}

pub fn validate(ctx: &Context, args: &StackArgs) -> Result<()> {
    let loaded = LoadedStack::load(&args.file, &args.state)?;
    let graph = loaded.stack.resolve()?;
    let order = graph.topological_order()?;

    if ctx.quiet {
        return Ok(());
    }

    ui::success(&format!(
        "Stack '{}' is valid: {} resources, {} references",
        loaded.stack.name(),
        graph.len(),
        graph.edges().len()
    ));

    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    for descriptor in loaded.stack.descriptors() {
        *kinds.entry(descriptor.kind.to_string()).or_default() += 1;
    }
    for (kind, count) in &kinds {
        ui::kv(kind, &count.to_string());
    }

    if ctx.verbose > 0 {
        println!();
        for (position, index) in order.iter().enumerate() {
            println!("  {:>3}. {}", position + 1, graph.nodes()[*index].bold());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const STACK: &str = r#"
[stack]
name = "orders"

[[resource]]
id = "dead-letter"
kind = "sqs_queue"

[[resource]]
id = "queue"
kind = "sqs_queue"
[resource.args]
dlq = { ref = "dead-letter.arn" }
"#;

    fn ctx() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    fn apply_args(dir: &Path, fail: &[&str]) -> ApplyArgs {
        let file = dir.join("stack.toml");
        fs::write(&file, STACK).unwrap();
        ApplyArgs {
            stack: StackArgs {
                file: file.to_string_lossy().into_owned(),
                state: dir.join("state.json").to_string_lossy().into_owned(),
            },
            target: None,
            dry_run: false,
            yes: true,
            jobs: 2,
            fail: fail.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_apply_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        apply(&ctx(), &apply_args(dir.path(), &[])).unwrap();

        let state = StateFile::load(&dir.path().join("state.json")).unwrap().unwrap();
        assert_eq!(state.snapshot.len(), 2);

        // Nothing left to change
        apply(&ctx(), &apply_args(dir.path(), &["queue"])).unwrap();
    }

    #[test]
    fn test_apply_fails_when_every_change_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply(&ctx(), &apply_args(dir.path(), &["dead-letter"])).unwrap_err();

        assert!(err.to_string().contains("1 resources failed"));
        assert!(!dir.path().join("state.json").exists());
    }

    #[test]
    fn test_apply_keeps_partial_progress() {
        let dir = tempfile::tempdir().unwrap();
        assert!(apply(&ctx(), &apply_args(dir.path(), &["queue"])).is_err());

        let state = StateFile::load(&dir.path().join("state.json")).unwrap().unwrap();
        assert!(state.snapshot.contains("dead-letter"));
        assert!(!state.snapshot.contains("queue"));
    }
}
