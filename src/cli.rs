use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::config::{DEFAULT_STACK_FILE, DEFAULT_STATE_FILE};

#[derive(Parser)]
#[command(name = "stackplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan and apply stacks of cross-referencing cloud resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Realize the stack in dependency order
    Apply(ApplyArgs),

    /// Print the dependency graph
    Graph(GraphArgs),

    /// Check that every reference resolves and the graph is acyclic
    Validate(StackArgs),

    /// Print an example stack file for the fan-out pipeline
    Template(TemplateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared
// ============================================================================

#[derive(Args, Clone)]
pub struct StackArgs {
    /// Stack file to read
    #[arg(short, long, default_value = DEFAULT_STACK_FILE)]
    pub file: String,

    /// Where the last apply's state is kept
    #[arg(long, default_value = DEFAULT_STATE_FILE)]
    pub state: String,
}

// ============================================================================
// Plan / Apply
// ============================================================================

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Only plan resources matching this target (kind, kind.name or id)
    pub target: Option<String>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Only apply resources matching this target (kind, kind.name or id)
    pub target: Option<String>,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs within a phase
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Make the provider fail for this resource id (repeatable)
    #[arg(long = "fail", value_name = "ID")]
    pub fail: Vec<String>,
}

// ============================================================================
// Graph / Template
// ============================================================================

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
}

#[derive(Args)]
pub struct GraphArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = GraphFormat::Text)]
    pub format: GraphFormat,
}

#[derive(Args)]
pub struct TemplateArgs {
    /// Prefix for every physical resource name
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Region the pipeline is deployed to
    #[arg(short, long)]
    pub region: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_args() {
        let cli = Cli::parse_from([
            "stackplan", "-vv", "apply", "queue", "-y", "-j", "2", "--fail", "topic",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("queue"));
        assert!(args.yes);
        assert_eq!(args.jobs, 2);
        assert_eq!(args.fail, vec!["topic"]);
        assert_eq!(args.stack.file, DEFAULT_STACK_FILE);
    }
}
