use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nowtaint CLI options.
#[derive(Debug, Parser)]
#[command(
    name = "nowtaint",
    version,
    about = "Detect clock-read values flowing into storage-mutation calls",
    args_conflicts_with_subcommands = true,
    subcommand_precedence_over_arg = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub analyze: AnalyzeArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze JSON program dumps.
    Analyze(AnalyzeArgs),

    /// Print the SSA form of JSON program dumps and exit.
    Dump {
        /// Program dump files.
        #[arg(value_name = "PROGRAM", required = true)]
        programs: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, ClapArgs)]
pub struct AnalyzeArgs {
    /// Program dump files to analyze. Defaults to stdin when absent.
    #[arg(value_name = "PROGRAM")]
    pub programs: Vec<PathBuf>,

    /// Explicit config file (otherwise nowtaint.toml is discovered by
    /// walking up from the first input's directory).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Exit with code 1 if any diagnostics are emitted.
    #[arg(long)]
    pub deny_warnings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Github,
}
