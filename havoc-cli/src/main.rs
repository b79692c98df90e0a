//! HAVOC CLI - Command-line interface
//!
//! Commands:
//! - sweep: run the batch experiments declared in a manifest
//! - tune: search enemy parameter spaces for worst-case interference

use clap::{Parser, Subcommand};

mod sweep_cmd;
mod tune_cmd;

#[derive(Parser)]
#[command(name = "havoc")]
#[command(about = "Worst-case interference experiment driver")]
struct Cli {
    /// Random seed for reproducible tuning runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run batch experiments from a manifest
    Sweep(sweep_cmd::SweepArgs),
    /// Run tuning sessions from a session file
    Tune(tune_cmd::TuneArgs),
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep(args) => sweep_cmd::run(args),
        Commands::Tune(args) => tune_cmd::run(args, cli.seed),
    }
}
