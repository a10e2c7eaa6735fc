//! The `cdep` command-line interface: incremental change detection for C,
//! C++ and Objective-C builds.
//!
//! Provides `cdep depend` to detect header dependencies and record compilation
//! state, `cdep status` to preview what would be recompiled, and `cdep clean`
//! to forget stored state.

#![warn(missing_docs)]

mod clean;
mod depend;
mod logging;
mod project;
mod status;

use std::process;
use std::sync::Arc;

use cdep_common::{MetricsSink, OperationStats};
use clap::{Parser, Subcommand};

/// Incremental change detection for native builds.
#[derive(Parser, Debug)]
#[command(name = "cdep", version, about = "Incremental change detection for C-family builds")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `cdep.toml` configuration file or project directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Print operation timings after the command.
    #[arg(long, global = true)]
    pub stats: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect header dependencies and record compilation state.
    Depend(DependArgs),
    /// Show what would be recompiled without recording anything.
    Status(StatusArgs),
    /// Remove stored compilation state.
    Clean(CleanArgs),
}

/// Arguments for the `cdep depend` subcommand.
#[derive(Parser, Debug)]
pub struct DependArgs {
    /// Task names to run (default: every task in `cdep.toml`).
    #[arg(short, long)]
    pub task: Vec<String>,

    /// List the individual files to recompile and removed.
    #[arg(short, long)]
    pub list: bool,
}

/// Arguments for the `cdep status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Task names to check (default: every task in `cdep.toml`).
    #[arg(short, long)]
    pub task: Vec<String>,

    /// List the individual files to recompile and removed.
    #[arg(short, long)]
    pub list: bool,
}

/// Arguments for the `cdep clean` subcommand.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Task names to clean (default: every task in `cdep.toml`).
    #[arg(short, long)]
    pub task: Vec<String>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
    /// Whether to print operation timings.
    pub stats: bool,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        stats: cli.stats,
    };
    logging::init_logging(&global);

    let stats = Arc::new(OperationStats::new());
    let metrics: Arc<dyn MetricsSink> = Arc::clone(&stats) as Arc<dyn MetricsSink>;

    let result = match cli.command {
        Command::Depend(ref args) => depend::run(args, &global, metrics),
        Command::Status(ref args) => status::run(args, &global, metrics),
        Command::Clean(ref args) => clean::run(args, &global),
    };

    if global.stats {
        print_stats(&stats);
    }

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn print_stats(stats: &OperationStats) {
    for (op, report) in stats.report_and_clear() {
        if report.count == 0 {
            continue;
        }
        let average = report.average().unwrap_or_default();
        eprintln!(
            "{op:>20}: {:>6} calls, {:>10.3?} total, {:>10.3?} avg",
            report.count, report.total, average
        );
    }
}
