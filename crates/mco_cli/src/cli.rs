use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI surface: `mco review` / `mco run`.
#[derive(Debug, Parser)]
#[command(name = "mco")]
#[command(about = "Dispatch a prompt to several coding-agent CLIs in parallel and aggregate their results")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fan a prompt out to every requested provider and aggregate review findings into a decision.
    Review(TaskArgs),
    /// Fan a prompt out to every requested provider and aggregate free-form run output.
    Run(TaskArgs),
}

/// Flags shared by `review` and `run`.
#[derive(Debug, Args, Clone)]
pub struct TaskArgs {
    #[arg(long)]
    pub repo: PathBuf,

    #[arg(long)]
    pub prompt: Option<String>,

    #[arg(long = "prompt-file")]
    pub prompt_file: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    pub providers: Option<Vec<String>>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub json: bool,

    #[arg(long = "result-mode", value_enum, default_value = "artifact")]
    pub result_mode: ResultMode,

    #[arg(long = "allow-paths", value_delimiter = ',')]
    pub allow_paths: Vec<PathBuf>,

    #[arg(long = "target-paths", value_delimiter = ',')]
    pub target_paths: Vec<PathBuf>,

    #[arg(long = "enforcement-mode", value_enum)]
    pub enforcement_mode: Option<EnforcementModeArg>,

    #[arg(long = "stall-timeout")]
    pub stall_timeout: Option<u64>,

    #[arg(long = "review-hard-timeout")]
    pub review_hard_timeout: Option<u64>,

    #[arg(long = "max-parallelism")]
    pub max_parallelism: Option<usize>,

    /// Print the resolved Task/Policy and each admitted provider's
    /// build_invocation argv, then exit without spawning anything.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum ResultMode {
    Artifact,
    Stdout,
    Both,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum EnforcementModeArg {
    Strict,
    Lenient,
}

impl From<EnforcementModeArg> for mco_core::EnforcementMode {
    fn from(value: EnforcementModeArg) -> Self {
        match value {
            EnforcementModeArg::Strict => mco_core::EnforcementMode::Strict,
            EnforcementModeArg::Lenient => mco_core::EnforcementMode::Lenient,
        }
    }
}
