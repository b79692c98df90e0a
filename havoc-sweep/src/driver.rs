//! Batch sweep driver - runs every experiment in a manifest
//!
//! ## Architecture (3-layer granularity)
//!
//! - Level 1: run() - orchestration over manifest entries
//! - Level 2: run_sweep_entry(), run_mapping_entry(), run_ranked_entry()
//! - Level 3: trial series execution, partial-file persistence, merge

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{Map, Value};

use havoc_core::{
    CoreAssignment, HavocError, Oracle, Result, TemperatureSource, ThermalGate, TrialExecutor,
};

use crate::manifest::{ExperimentManifest, ExperimentSpec, MappingSpec, RankedSpec, SweepSpec};
use crate::merge::merge_dir;
use crate::result::{ConfigurationResult, RankedResult};

/// Driver-level settings
#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Where the run-scoped temp directory is created
    pub temp_root: PathBuf,
    /// Reject ranked searches above this many assignments
    pub ranked_budget: u64,
    /// Thermal gate applied before every trial
    pub gate: ThermalGate,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            temp_root: PathBuf::from("."),
            ranked_budget: 4096,
            gate: ThermalGate::default(),
        }
    }
}

/// Runs batch experiments against a trial executor.
///
/// The driver exclusively owns a run-scoped temp directory: every
/// configuration's result is written there as soon as it is computed,
/// so a crash mid-sweep loses at most the configuration in flight.
pub struct SweepDriver<E, T> {
    oracle: Oracle<E, T>,
    ranked_budget: u64,
    temp_dir: PathBuf,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

impl<E: TrialExecutor, T: TemperatureSource> SweepDriver<E, T> {
    /// Create a driver and its run-scoped temp directory.
    ///
    /// The directory name carries a time-derived suffix so concurrent
    /// driver instances on one filesystem cannot collide.
    pub fn new(executor: E, thermometer: T, config: SweepConfig) -> Result<Self> {
        let temp_dir = config
            .temp_root
            .join(format!("temp_{}", Local::now().format("%H%M%S%3f")));
        fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            oracle: Oracle::new(executor, thermometer, config.gate),
            ranked_budget: config.ranked_budget,
            temp_dir,
        })
    }

    /// The run-scoped temp directory
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Run every manifest entry and write the merged result document.
    pub fn run(&mut self, manifest: &ExperimentManifest, output: &Path) -> Result<()> {
        self.run_with_callback(manifest, output, |_, _| {})
    }

    /// Like [`run`](Self::run), invoking `progress` once per completed
    /// configuration with (experiment name, configuration label).
    ///
    /// A failing entry or configuration is reported and skipped; only
    /// the merge and final write can fail the run as a whole.
    pub fn run_with_callback(
        &mut self,
        manifest: &ExperimentManifest,
        output: &Path,
        mut progress: impl FnMut(&str, &str),
    ) -> Result<()> {
        for (name, spec) in manifest.iter() {
            tracing::info!("running experiment '{}'", name);
            let outcome = match spec {
                ExperimentSpec::Sweep(spec) => self.run_sweep_entry(name, spec, &mut progress),
                ExperimentSpec::Mapping(spec) => self.run_mapping_entry(name, spec, &mut progress),
                ExperimentSpec::Ranked(spec) => self.run_ranked_entry(name, spec, &mut progress),
            };
            if let Err(e) = outcome {
                tracing::warn!("experiment '{}' failed: {}", name, e);
            }
        }

        let merged = merge_dir(&self.temp_dir)?;
        fs::write(output, serde_json::to_string_pretty(&merged)?)?;
        fs::remove_dir_all(&self.temp_dir)?;
        tracing::info!("merged results written to {}", output.display());
        Ok(())
    }
}

// ============================================================================
// LEVEL 2 - PER-KIND PHASES
// ============================================================================

impl<E: TrialExecutor, T: TemperatureSource> SweepDriver<E, T> {
    /// Cartesian sweep: sut x stress x cores, outer to inner.
    ///
    /// Each tuple yields one `config_N` result compared against a
    /// zero-enemy baseline. A failing tuple is skipped; the label
    /// counter still advances so labels stay stable.
    fn run_sweep_entry(
        &mut self,
        name: &str,
        spec: &SweepSpec,
        progress: &mut impl FnMut(&str, &str),
    ) -> Result<()> {
        let mut config_index = 1u32;
        for sut in &spec.suts {
            for stress in &spec.stress {
                for &cores in &spec.cores {
                    let label = format!("config_{}", config_index);
                    config_index += 1;

                    tracing::info!(
                        "{}/{}: sut={} stress={} cores={}",
                        name,
                        label,
                        sut,
                        stress,
                        cores
                    );
                    match self.run_sweep_config(spec, sut, stress, cores) {
                        Ok(result) => {
                            let document =
                                nest(name, nest(&label, result.to_value()));
                            self.write_partial(&format!("{}_{}", name, label), &document)?;
                            progress(name, &label);
                        }
                        Err(e) => tracing::warn!("{}/{} skipped: {}", name, label, e),
                    }
                }
            }
        }
        Ok(())
    }

    /// Baseline vs. one declared core mapping; exactly two series.
    fn run_mapping_entry(
        &mut self,
        name: &str,
        spec: &MappingSpec,
        progress: &mut impl FnMut(&str, &str),
    ) -> Result<()> {
        let baseline = self.oracle.run_series(
            &spec.sut,
            &CoreAssignment::empty(),
            spec.iterations,
            spec.max_temperature as f64,
        )?;
        let treatment = self.oracle.run_series(
            &spec.sut,
            &spec.mapping,
            spec.iterations,
            spec.max_temperature as f64,
        )?;

        let result = ConfigurationResult {
            sut: spec.sut.clone(),
            stress: spec.mapping.to_string(),
            cores: spec.mapping.len() as u32,
            iterations: spec.iterations,
            baseline,
            treatment,
        };
        let document = nest(name, result.to_value());
        self.write_partial(name, &document)?;
        progress(name, "mapping");
        Ok(())
    }

    /// Full combinatorial search over `ranked_list^cores` assignments.
    ///
    /// The baseline is computed exactly once; each assignment gets its
    /// own treatment series and a row in the ranking table.
    fn run_ranked_entry(
        &mut self,
        name: &str,
        spec: &RankedSpec,
        progress: &mut impl FnMut(&str, &str),
    ) -> Result<()> {
        let assignments = (spec.ranked_list.len() as u64)
            .checked_pow(spec.cores)
            .unwrap_or(u64::MAX);
        if assignments > self.ranked_budget {
            return Err(HavocError::Config(format!(
                "experiment '{}': {}^{} = {} assignments exceeds the search budget of {}",
                name,
                spec.ranked_list.len(),
                spec.cores,
                assignments,
                self.ranked_budget
            )));
        }

        let baseline = self.oracle.run_series(
            &spec.sut,
            &CoreAssignment::empty(),
            spec.iterations,
            spec.max_temperature as f64,
        )?;

        let mut table = Vec::with_capacity(assignments as usize);
        for combo in CartesianPower::new(spec.ranked_list.len(), spec.cores as usize) {
            let assignment: CoreAssignment = combo
                .iter()
                .enumerate()
                .map(|(slot, &choice)| (slot as u32 + 1, spec.ranked_list[choice].clone()))
                .collect();
            let descriptor = combo
                .iter()
                .map(|&choice| spec.ranked_list[choice].as_str())
                .collect::<Vec<_>>()
                .join(",");

            match self.oracle.run_series(
                &spec.sut,
                &assignment,
                spec.iterations,
                spec.max_temperature as f64,
            ) {
                Ok(series) => {
                    tracing::info!("{}: {} -> {:.4}s mean", name, descriptor, series.time_mean());
                    table.push((descriptor.clone(), series.time_mean()));
                }
                Err(e) => tracing::warn!("{}: assignment {} skipped: {}", name, descriptor, e),
            }
            progress(name, &descriptor);
        }

        let result = RankedResult::new(
            spec.sut.clone(),
            spec.ranked_list.clone(),
            spec.cores,
            spec.iterations,
            baseline,
            table,
        );
        let document = nest(name, result.to_value());
        self.write_partial(name, &document)
    }
}

/// Wrap a value in a single-key object
fn nest(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

impl<E: TrialExecutor, T: TemperatureSource> SweepDriver<E, T> {
    /// Baseline (zero enemy cores) then treatment for one sweep tuple
    fn run_sweep_config(
        &mut self,
        spec: &SweepSpec,
        sut: &str,
        stress: &str,
        cores: u32,
    ) -> Result<ConfigurationResult> {
        let ceiling = spec.max_temperature as f64;
        let baseline =
            self.oracle
                .run_series(sut, &CoreAssignment::empty(), spec.iterations, ceiling)?;
        let treatment = self.oracle.run_series(
            sut,
            &CoreAssignment::uniform(cores, stress),
            spec.iterations,
            ceiling,
        )?;

        Ok(ConfigurationResult {
            sut: sut.to_string(),
            stress: stress.to_string(),
            cores,
            iterations: spec.iterations,
            baseline,
            treatment,
        })
    }

    /// Persist one configuration's document into the temp directory
    fn write_partial(&self, stem: &str, document: &Value) -> Result<()> {
        let path = self.temp_dir.join(format!("{}.json", stem));
        fs::write(&path, serde_json::to_string_pretty(document)?)?;
        Ok(())
    }
}

/// Every way of filling `slots` positions from `base` choices, with
/// repetition; the first slot is the most significant.
struct CartesianPower {
    base: usize,
    next: Option<Vec<usize>>,
}

impl CartesianPower {
    fn new(base: usize, slots: usize) -> Self {
        let next = if base == 0 && slots > 0 {
            None
        } else {
            Some(vec![0; slots])
        };
        Self { base, next }
    }
}

impl Iterator for CartesianPower {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;

        // Odometer increment, least significant slot last
        let mut successor = current.clone();
        let mut slot = successor.len();
        loop {
            if slot == 0 {
                break;
            }
            slot -= 1;
            successor[slot] += 1;
            if successor[slot] < self.base {
                self.next = Some(successor);
                break;
            }
            successor[slot] = 0;
        }

        Some(current)
    }
}
