//! Plan and graph display

use crate::ui;
use colored::Colorize;
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};
use stackgraph::{AttributeStore, DependencyGraph, ExecutionPlan, PlanStep, Snapshot, Stack};
use std::fmt::Write as _;

/// Display a plan grouped by phase
///
/// With `verbose`, arguments of created resources are listed and updates
/// show a line diff against the arguments recorded in `prior`.
pub fn display_plan(plan: &ExecutionPlan, prior: Option<&Snapshot>, verbose: bool) {
    let summary = plan.summary();
    if plan.is_empty() {
        println!();
        println!("  {} Nothing declared", "ℹ".blue());
        return;
    }

    let store = prior.map(Snapshot::attribute_store).unwrap_or_default();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");

    for (index, phase) in plan.phases().iter().enumerate() {
        println!("│ {}", format!("Phase {index}").bold());
        for step in phase {
            print_step(step, &store, prior, verbose);
        }
        println!("│");
    }

    if !plan.deletions.is_empty() {
        println!("│ {}", "Deletions".bold());
        for deletion in &plan.deletions {
            println!(
                "│   {} {:<28} {}",
                ui::operation_symbol(stackgraph::Operation::Delete),
                deletion.id,
                deletion.kind.to_string().dimmed()
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to delete, {} unchanged",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.delete.to_string().red(),
        summary.no_op.to_string().dimmed()
    );
    println!("└─────────────────────────────────────────────────────┘");

    if !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
    }
}

fn print_step(step: &PlanStep, store: &AttributeStore, prior: Option<&Snapshot>, verbose: bool) {
    let deps = if step.dependencies.is_empty() {
        String::new()
    } else {
        format!(" ← {}", step.dependencies.join(", "))
    };

    println!(
        "│   {} {:<28} {}{}",
        ui::operation_symbol(step.operation),
        step.id(),
        step.kind().to_string().dimmed(),
        deps.dimmed()
    );

    if !verbose {
        return;
    }

    let desired = preview_arguments(step, store);
    let recorded = prior
        .and_then(|snapshot| snapshot.get(step.id()))
        .map(|realized| Value::Object(realized.arguments.clone().into_iter().collect()));

    match (step.operation, recorded) {
        (stackgraph::Operation::Update, Some(recorded)) => {
            for (tag, line) in argument_diff(&recorded, &desired) {
                let text = match tag {
                    ChangeTag::Delete => format!("- {line}").red(),
                    ChangeTag::Insert => format!("+ {line}").green(),
                    ChangeTag::Equal => continue,
                };
                println!("│       {text}");
            }
        }
        (stackgraph::Operation::Create, _) => {
            if let Value::Object(arguments) = &desired {
                for (name, value) in arguments {
                    println!(
                        "│       {} = {}",
                        name.dimmed(),
                        ui::truncate(&value.to_string(), 80)
                    );
                }
            }
        }
        _ => {}
    }
}

/// Arguments with everything resolvable from prior state filled in
pub fn preview_arguments(step: &PlanStep, store: &AttributeStore) -> Value {
    let arguments: Map<String, Value> = step
        .descriptor
        .arguments
        .iter()
        .map(|(name, value)| (name.clone(), value.preview(store)))
        .collect();
    Value::Object(arguments)
}

/// Line diff between two argument sets rendered as pretty JSON
pub fn argument_diff(old: &Value, new: &Value) -> Vec<(ChangeTag, String)> {
    let old_text = serde_json::to_string_pretty(old).unwrap_or_default();
    let new_text = serde_json::to_string_pretty(new).unwrap_or_default();

    TextDiff::from_lines(&old_text, &new_text)
        .iter_all_changes()
        .map(|change| (change.tag(), change.value().trim_end().to_string()))
        .collect()
}

/// Indented text rendering: each resource with what it depends on
pub fn render_graph_text(stack: &Stack, graph: &DependencyGraph) -> String {
    let mut out = String::new();
    for id in graph.nodes() {
        let kind = stack
            .get(id)
            .map(|d| d.kind.to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "{id} ({kind})");
        for dependency in graph.dependencies(id) {
            let _ = writeln!(out, "  <- {dependency}");
        }
    }
    out
}

/// Graphviz DOT rendering; edges point from dependency to dependent
pub fn render_graph_dot(stack: &Stack, graph: &DependencyGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(stack.name()));
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [shape=box];");
    for id in graph.nodes() {
        let kind = stack
            .get(id)
            .map(|d| d.kind.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"{}\\n{}\"];",
            escape(id),
            escape(id),
            escape(&kind)
        );
    }
    for (from, to) in graph.edges() {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(from), escape(to));
    }
    out.push_str("}\n");
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
