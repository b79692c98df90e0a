//! Tune command - run tuning sessions from a session file
//!
//! ## Architecture (3-layer granularity)
//!
//! - Level 1: run() - orchestration over sessions
//! - Level 2: driver construction, per-session execution
//! - Level 3: summary formatting

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use havoc_core::{Compiler, ProcessExecutor, ThermalGate, ThermalZoneSource};
use havoc_tune::{TuneConfig, TuneDriver, TuneOutcome, TuningManifest};

// ============================================================================
// COMMAND ARGUMENTS
// ============================================================================

#[derive(Args)]
pub struct TuneArgs {
    /// Tuning session manifest (JSON)
    pub sessions: PathBuf,

    /// Root directory of the known enemy templates
    #[arg(long, default_value = "templates")]
    pub templates_root: PathBuf,

    /// Directory enemy artifacts are compiled into
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Thermal zone file to read temperatures from
    #[arg(long, default_value = "/sys/class/thermal/thermal_zone0/temp")]
    pub thermal_zone: PathBuf,

    /// Ceiling on thermal-gate wait time, in seconds
    #[arg(long, default_value = "600")]
    pub max_cooldown_wait: u64,

    /// C compiler used to build enemy templates
    #[arg(long, default_value = "cc")]
    pub compiler: String,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run tune command
pub fn run(args: TuneArgs, seed: Option<u64>) -> Result<()> {
    let manifest = TuningManifest::load(&args.sessions)
        .with_context(|| format!("failed to load {}", args.sessions.display()))?;
    if manifest.is_empty() {
        anyhow::bail!("no runnable tuning sessions in {}", args.sessions.display());
    }

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut driver = build_driver(&args);

    for (name, session) in manifest.iter() {
        match driver.run_session(name, session, &mut rng) {
            Ok(outcome) => print_summary(name, session.log_file.display(), &outcome),
            Err(e) => tracing::warn!("tuning session '{}' failed: {}", name, e),
        }
    }
    Ok(())
}

// ============================================================================
// LEVEL 2 - SETUP
// ============================================================================

fn build_driver(args: &TuneArgs) -> TuneDriver<ProcessExecutor, ThermalZoneSource> {
    let executor =
        ProcessExecutor::new().with_thermometer(ThermalZoneSource::new(&args.thermal_zone));
    let thermometer = ThermalZoneSource::new(&args.thermal_zone);

    let config = TuneConfig {
        templates_root: args.templates_root.clone(),
        work_dir: args.work_dir.clone(),
        gate: ThermalGate::new(
            Duration::from_secs(60),
            Duration::from_secs(args.max_cooldown_wait),
        ),
    };
    TuneDriver::new(
        executor,
        thermometer,
        Compiler::new(args.compiler.clone()),
        config,
    )
}

// ============================================================================
// LEVEL 3 - REPORTING
// ============================================================================

fn print_summary(name: &str, log: impl std::fmt::Display, outcome: &TuneOutcome) {
    println!("=== {} ===", name);
    println!("  Best value:  {:.4}", outcome.best_value);
    println!("  Best params: {}", outcome.best_params);
    println!("  Iterations:  {}", outcome.iterations);
    println!("  Log:         {}", log);
}
