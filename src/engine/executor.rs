//! Apply with terminal UI: progress bar, confirmation prompt and summary

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use stackgraph::{
    ApplyResult, AutoConfirm, ConfirmCallback, ExecuteOptions, ExecuteOutcome, ExecuteSummary,
    ExecutionPlan, ProgressCallback, Provider, Snapshot,
};

use crate::ui;

/// Options for an interactive apply
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs within a phase
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Hide the progress bar
    pub quiet: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            quiet: false,
        }
    }
}

/// Progress bar driven by executor callbacks
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: usize, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_phase_start(&mut self, phase: usize, count: usize) {
        log::debug!("Phase {phase}: {count} resources");
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        self.bar.set_message(ui::truncate(id, 30));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        self.bar.inc(1);
        self.bar
            .set_message(format!("{} {}", ui::result_symbol(result), ui::truncate(id, 30)));

        match result {
            ApplyResult::Failed { error } => self.bar.suspend(|| {
                println!("  {} {} ({})", "✗".red(), id, error);
            }),
            ApplyResult::Skipped { reason } => self.bar.suspend(|| {
                println!("  {} {} ({})", "⊘".yellow(), id, reason.dimmed());
            }),
            _ => {}
        }
    }

    fn on_phase_complete(&mut self, _phase: usize) {}
}

/// Asks on the terminal before anything changes
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> stackgraph::Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(|e| stackgraph::Error::Interaction(e.to_string()))
    }
}

/// Execute a plan with the terminal UI and print the summary
pub fn execute(
    plan: &ExecutionPlan,
    prior: Option<&Snapshot>,
    provider: &dyn Provider,
    opts: &ApplyOptions,
) -> Result<ExecuteOutcome> {
    let exec_opts = ExecuteOptions {
        dry_run: opts.dry_run,
        jobs: opts.jobs,
        ..Default::default()
    };

    let mut progress = BarProgress::new(plan.len(), opts.quiet || opts.dry_run);
    let outcome = if opts.yes {
        stackgraph::execute(plan, prior, provider, &exec_opts, &mut progress, &mut AutoConfirm)
    } else {
        stackgraph::execute(plan, prior, provider, &exec_opts, &mut progress, &mut PromptConfirm)
    };
    progress.finish();
    let outcome = outcome?;

    if !plan.has_changes() {
        return Ok(outcome);
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if outcome.summary.total_changes() == 0 && outcome.summary.failed == 0 {
        println!();
        println!("  {} Aborted", "✗".red());
    } else {
        print_summary(&outcome.summary);
    }

    Ok(outcome)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Stack applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Stack applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources updated", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources deleted", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
