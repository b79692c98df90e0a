//! Sweep command - run batch experiments from a manifest
//!
//! ## Architecture (3-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: driver construction, driver execution
//! - Level 3: progress reporting

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use havoc_core::{ProcessExecutor, ThermalGate, ThermalZoneSource};
use havoc_sweep::{ExperimentManifest, SweepConfig, SweepDriver};

// ============================================================================
// COMMAND ARGUMENTS
// ============================================================================

#[derive(Args)]
pub struct SweepArgs {
    /// Experiment manifest (JSON)
    pub experiments: PathBuf,

    /// Output result document (JSON)
    pub results: PathBuf,

    /// Thermal zone file to read temperatures from
    #[arg(long, default_value = "/sys/class/thermal/thermal_zone0/temp")]
    pub thermal_zone: PathBuf,

    /// Seconds between thermal-gate polls
    #[arg(long, default_value = "60")]
    pub cooldown: u64,

    /// Ceiling on thermal-gate wait time, in seconds
    #[arg(long, default_value = "600")]
    pub max_cooldown_wait: u64,

    /// Reject ranked searches above this many assignments
    #[arg(long, default_value = "4096")]
    pub ranked_budget: u64,

    /// Directory for the run-scoped partial-result files
    #[arg(long, default_value = ".")]
    pub temp_root: PathBuf,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run sweep command
pub fn run(args: SweepArgs) -> Result<()> {
    let manifest = ExperimentManifest::load(&args.experiments)
        .with_context(|| format!("failed to load {}", args.experiments.display()))?;
    if manifest.is_empty() {
        anyhow::bail!("no runnable experiments in {}", args.experiments.display());
    }
    tracing::info!(
        "loaded {} experiments from {}",
        manifest.len(),
        args.experiments.display()
    );

    let mut driver = build_driver(&args).context("failed to set up sweep driver")?;

    let bar = make_progress_bar();
    driver
        .run_with_callback(&manifest, &args.results, |entry, label| {
            bar.set_message(format!("{}/{}", entry, label));
            bar.inc(1);
        })
        .context("sweep run failed")?;
    bar.finish_and_clear();

    println!("Results written to {}", args.results.display());
    Ok(())
}

// ============================================================================
// LEVEL 2 - SETUP
// ============================================================================

fn build_driver(args: &SweepArgs) -> Result<SweepDriver<ProcessExecutor, ThermalZoneSource>> {
    let executor =
        ProcessExecutor::new().with_thermometer(ThermalZoneSource::new(&args.thermal_zone));
    let thermometer = ThermalZoneSource::new(&args.thermal_zone);

    let config = SweepConfig {
        temp_root: args.temp_root.clone(),
        ranked_budget: args.ranked_budget,
        gate: ThermalGate::new(
            Duration::from_secs(args.cooldown),
            Duration::from_secs(args.max_cooldown_wait),
        ),
    };
    Ok(SweepDriver::new(executor, thermometer, config)?)
}

fn make_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {pos} configurations done: {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}
