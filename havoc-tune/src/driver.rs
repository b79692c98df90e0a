//! Tuning driver - searches enemy parameter spaces against the oracle
//!
//! ## Architecture (3-layer granularity)
//!
//! - Level 1: run_session() - orchestration
//! - Level 2: fuzz_train(), bayesian_train() - search strategies
//! - Level 3: proposal, build, trial evaluation, record keeping
//!
//! Both strategies check the wall-clock deadline between iterations
//! only: a trial in progress always runs to completion.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use havoc_core::params::format_assignment;
use havoc_core::{
    known_templates, Artifact, Compiler, CoreAssignment, EnemyTemplate, HavocError, Oracle,
    ParamAssignment, ParameterSpace, Result, TemperatureSource, ThermalGate, TrialExecutor,
};

use crate::log::{write_max_file, SearchLog, SearchRecord};
use crate::optimizer::{BayesianOptimizer, Optimizer};
use crate::session::{Method, TuningSession};

/// Random samples seeding the Bayesian strategy, counted as iterations
pub const INIT_POINTS: u64 = 5;

/// Driver-level settings
#[derive(Clone, Debug)]
pub struct TuneConfig {
    /// Root of the known template set
    pub templates_root: PathBuf,
    /// Where enemy artifacts are compiled to
    pub work_dir: PathBuf,
    /// Thermal gate applied before every trial; the poll interval is
    /// overridden by each session's `cooldown_time`
    pub gate: ThermalGate,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            templates_root: PathBuf::from("templates"),
            work_dir: PathBuf::from("."),
            gate: ThermalGate::default(),
        }
    }
}

/// One enemy core's configuration for a single iteration
#[derive(Clone, Debug)]
pub struct EnemySetup {
    pub template: EnemyTemplate,
    pub assignment: ParamAssignment,
}

/// Result of a completed tuning session
#[derive(Clone, Debug)]
pub struct TuneOutcome {
    pub iterations: u64,
    pub best_value: f64,
    pub best_params: String,
}

/// Runs tuning sessions against a trial executor.
///
/// The driver exclusively owns the enemy artifacts it compiles; each
/// iteration's artifacts are disposed before the next iteration builds.
pub struct TuneDriver<E, T> {
    oracle: Oracle<E, T>,
    compiler: Compiler,
    templates_root: PathBuf,
    work_dir: PathBuf,
    spaces: FxHashMap<PathBuf, ParameterSpace>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

impl<E: TrialExecutor, T: TemperatureSource> TuneDriver<E, T> {
    pub fn new(executor: E, thermometer: T, compiler: Compiler, config: TuneConfig) -> Self {
        Self {
            oracle: Oracle::new(executor, thermometer, config.gate),
            compiler,
            templates_root: config.templates_root,
            work_dir: config.work_dir,
            spaces: FxHashMap::default(),
        }
    }

    /// Run one session for its configured `training_time` minutes
    pub fn run_session(
        &mut self,
        name: &str,
        session: &TuningSession,
        rng: &mut ChaCha8Rng,
    ) -> Result<TuneOutcome> {
        let budget = Duration::from_secs(session.training_time * 60);
        self.run_session_with_budget(name, session, budget, rng)
    }

    /// Run one session under an explicit wall-clock budget
    pub fn run_session_with_budget(
        &mut self,
        name: &str,
        session: &TuningSession,
        budget: Duration,
        rng: &mut ChaCha8Rng,
    ) -> Result<TuneOutcome> {
        self.oracle.gate_mut().poll_interval = Duration::from_secs(session.cooldown_time);
        fs::create_dir_all(&self.work_dir)?;

        let mut log = SearchLog::create(&session.log_file)?;
        let started = Instant::now();
        let deadline = started + budget;

        tracing::info!(
            "tuning '{}': method={} sut={} cores={} budget={}s",
            name,
            session.method,
            session.sut,
            session.cores,
            budget.as_secs()
        );

        let outcome = match session.method {
            Method::Fuzz => self.fuzz_train(name, session, started, deadline, &mut log, rng)?,
            Method::Bayesian => {
                self.bayesian_train(name, session, started, deadline, &mut log, rng)?
            }
        };

        write_max_file(&session.max_file, outcome.best_value, &outcome.best_params)?;
        tracing::info!(
            "tuning '{}' finished: best {:.4} after {} iterations",
            name,
            outcome.best_value,
            outcome.iterations
        );
        Ok(outcome)
    }
}

// ============================================================================
// LEVEL 2 - SEARCH STRATEGIES
// ============================================================================

impl<E: TrialExecutor, T: TemperatureSource> TuneDriver<E, T> {
    /// Purely exploratory search: a fresh uniformly-random assignment
    /// every iteration, no history-informed proposals.
    fn fuzz_train(
        &mut self,
        name: &str,
        session: &TuningSession,
        started: Instant,
        deadline: Instant,
        log: &mut SearchLog,
        rng: &mut ChaCha8Rng,
    ) -> Result<TuneOutcome> {
        let templates = self.session_templates(session)?;
        let mut state = SearchState::new(started);

        while Instant::now() < deadline {
            state.iterations += 1;
            let setups = self.propose_random(&templates, session.cores, rng)?;
            let params = describe_setups(&setups);

            match self.evaluate(session, &setups) {
                Ok(value) => {
                    if value > state.best_value {
                        tracing::info!(
                            "tuning '{}': new max {:.4} at iteration {}",
                            name,
                            value,
                            state.iterations
                        );
                    }
                    state.record(log, Some(value), params)?;
                }
                Err(e) => {
                    tracing::warn!(
                        "tuning '{}': iteration {} skipped: {}",
                        name,
                        state.iterations,
                        e
                    );
                    state.record(log, None, params)?;
                }
            }
        }
        Ok(state.into_outcome())
    }

    /// Optimizer-guided search seeded with random samples.
    ///
    /// The seed samples run before the first deadline check so the
    /// surrogate always has observations to start from.
    fn bayesian_train(
        &mut self,
        name: &str,
        session: &TuningSession,
        started: Instant,
        deadline: Instant,
        log: &mut SearchLog,
        rng: &mut ChaCha8Rng,
    ) -> Result<TuneOutcome> {
        let template = session.template().ok_or_else(|| {
            HavocError::Config(format!(
                "tuning '{}': bayesian search needs template_file and template_data",
                name
            ))
        })?;
        let space = self.space_for(&template)?;
        let mut optimizer = BayesianOptimizer::new(space.bounds(), session.kappa as f64);
        let mut state = SearchState::new(started);

        for _ in 0..INIT_POINTS {
            state.iterations += 1;
            let assignment = space.sample_random(rng);
            self.bayesian_iteration(name, session, &template, assignment, &mut optimizer, &mut state, log)?;
        }

        while Instant::now() < deadline {
            state.iterations += 1;
            let proposed = optimizer.propose(rng);
            let assignment = space.validate_and_coerce(&proposed)?;
            self.bayesian_iteration(name, session, &template, assignment, &mut optimizer, &mut state, log)?;
        }
        Ok(state.into_outcome())
    }
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

impl<E: TrialExecutor, T: TemperatureSource> TuneDriver<E, T> {
    /// The templates this session searches over
    fn session_templates(&self, session: &TuningSession) -> Result<Vec<EnemyTemplate>> {
        match session.template() {
            Some(template) => Ok(vec![template]),
            None => Ok(known_templates(&self.templates_root)),
        }
    }

    /// Parameter space for a template, cached per side-car file
    fn space_for(&mut self, template: &EnemyTemplate) -> Result<ParameterSpace> {
        if let Some(space) = self.spaces.get(&template.params_file) {
            return Ok(space.clone());
        }
        let space = template.parameter_space()?;
        self.spaces.insert(template.params_file.clone(), space.clone());
        Ok(space)
    }

    /// Draw a random template (when unpinned) and random parameters for
    /// every enemy core.
    fn propose_random(
        &mut self,
        templates: &[EnemyTemplate],
        cores: u32,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EnemySetup>> {
        let mut setups = Vec::with_capacity(cores as usize);
        for _ in 0..cores {
            let template = templates
                .choose(rng)
                .cloned()
                .ok_or_else(|| HavocError::Config("no enemy templates available".to_string()))?;
            let space = self.space_for(&template)?;
            let assignment = space.sample_random(rng);
            setups.push(EnemySetup {
                template,
                assignment,
            });
        }
        Ok(setups)
    }

    /// Build every setup, run one thermally-gated trial, dispose the
    /// artifacts, and return the SUT's execution time.
    fn evaluate(&mut self, session: &TuningSession, setups: &[EnemySetup]) -> Result<f64> {
        let mut artifacts = Vec::with_capacity(setups.len());
        for (index, setup) in setups.iter().enumerate() {
            let output = self.work_dir.join(format!("{}_enemy.out", index));
            match self.compiler.build(&setup.template, &setup.assignment, &output) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    dispose_all(artifacts);
                    return Err(e);
                }
            }
        }

        let assignment: CoreAssignment = artifacts
            .iter()
            .enumerate()
            .map(|(index, artifact)| (index as u32 + 1, artifact.path().display().to_string()))
            .collect();

        let outcome = self
            .oracle
            .run_once(&session.sut, &assignment, session.max_temperature as f64);
        dispose_all(artifacts);
        Ok(outcome?.time)
    }

    /// One Bayesian iteration: the single shared assignment is built
    /// once and loaded onto every enemy core.
    #[allow(clippy::too_many_arguments)]
    fn bayesian_iteration(
        &mut self,
        name: &str,
        session: &TuningSession,
        template: &EnemyTemplate,
        assignment: ParamAssignment,
        optimizer: &mut BayesianOptimizer,
        state: &mut SearchState,
        log: &mut SearchLog,
    ) -> Result<()> {
        let params = format_assignment(&assignment);

        let output = self.work_dir.join("enemy.out");
        let built = self.compiler.build(template, &assignment, &output);
        let value = match built {
            Ok(artifact) => {
                let cores = CoreAssignment::uniform(
                    session.cores,
                    &artifact.path().display().to_string(),
                );
                let outcome =
                    self.oracle
                        .run_once(&session.sut, &cores, session.max_temperature as f64);
                dispose_all(vec![artifact]);
                match outcome {
                    Ok(sample) => Some(sample.time),
                    Err(e) => {
                        tracing::warn!(
                            "tuning '{}': iteration {} skipped: {}",
                            name,
                            state.iterations,
                            e
                        );
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "tuning '{}': iteration {} skipped: {}",
                    name,
                    state.iterations,
                    e
                );
                None
            }
        };

        if let Some(value) = value {
            let point = assignment
                .iter()
                .map(|(key, v)| (key.clone(), v.as_f64()))
                .collect();
            optimizer.observe(&point, value);
        }
        state.record(log, value, params)
    }
}

/// Mutable bookkeeping threaded through a search loop
struct SearchState {
    iterations: u64,
    best_value: f64,
    best_params: String,
    started: Instant,
}

impl SearchState {
    fn new(started: Instant) -> Self {
        Self {
            iterations: 0,
            best_value: 0.0,
            best_params: "none".to_string(),
            started,
        }
    }

    /// Update the running maximum and append a log record
    fn record(&mut self, log: &mut SearchLog, value: Option<f64>, params: String) -> Result<()> {
        if let Some(value) = value {
            if value > self.best_value {
                self.best_value = value;
                self.best_params = params.clone();
            }
        }
        log.append(&SearchRecord {
            iteration: self.iterations,
            elapsed_secs: self.started.elapsed().as_secs(),
            best: self.best_value,
            current: value,
            params,
        })
    }

    fn into_outcome(self) -> TuneOutcome {
        TuneOutcome {
            iterations: self.iterations,
            best_value: self.best_value,
            best_params: self.best_params,
        }
    }
}

/// Render an iteration's per-core setups for the log's Params column
fn describe_setups(setups: &[EnemySetup]) -> String {
    setups
        .iter()
        .map(|setup| {
            format!(
                "{}{{{}}}",
                setup.template.name,
                format_assignment(&setup.assignment)
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Best-effort removal of an iteration's artifacts
fn dispose_all(artifacts: Vec<Artifact>) {
    for artifact in artifacts {
        if let Err(e) = artifact.dispose() {
            tracing::warn!("failed to remove enemy artifact: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use havoc_core::TrialSample;
    use rand::SeedableRng;
    use serde_json::json;
    use std::path::Path;

    /// Executor whose reported time grows with each call
    struct RampExecutor {
        calls: u32,
    }

    impl TrialExecutor for RampExecutor {
        fn run(&mut self, _sut: &str, assignment: &CoreAssignment) -> Result<TrialSample> {
            assert!(!assignment.is_empty(), "tuning always loads enemies");
            self.calls += 1;
            Ok(TrialSample::timed(self.calls as f64))
        }
    }

    struct ColdThermometer;

    impl TemperatureSource for ColdThermometer {
        fn read_celsius(&mut self) -> Result<f64> {
            Ok(30.0)
        }
    }

    /// Stub toolchain that touches the output file and exits 0
    fn stub_compiler() -> Compiler {
        Compiler::new("sh")
            .with_flags(vec![
                "-c".to_string(),
                r#"for a; do last="$a"; done; : > "$last""#.to_string(),
            ])
            .with_libs(vec![])
    }

    fn failing_compiler() -> Compiler {
        Compiler::new("sh")
            .with_flags(vec!["-c".to_string(), "echo nope >&2; exit 1".to_string()])
            .with_libs(vec![])
    }

    fn write_template(dir: &Path) -> (PathBuf, PathBuf) {
        let source = dir.join("template_cache_stress.c");
        let params = dir.join("parameters.json");
        fs::write(&source, "int main(void) { return 0; }\n").unwrap();
        fs::write(
            &params,
            r#"{"DEFINES": {"SIZE": {"type": "int", "range": [1, 64]},
                            "RATIO": {"type": "float", "range": [0.0, 1.0]}}}"#,
        )
        .unwrap();
        (source, params)
    }

    fn make_session(dir: &Path, method: &str, pinned: bool) -> TuningSession {
        let mut value = json!({
            "sut": "victim",
            "cores": 2,
            "method": method,
            "kappa": 3,
            "log_file": dir.join("tuning.log"),
            "max_file": dir.join("max.txt"),
            "training_time": 1,
            "max_temperature": 70,
            "cooldown_time": 0
        });
        if pinned {
            let (source, params) = write_template(dir);
            value["template_file"] = json!(source);
            value["template_data"] = json!(params);
        }
        TuningSession::from_value("session", &value).unwrap()
    }

    fn make_driver(dir: &Path, compiler: Compiler) -> TuneDriver<RampExecutor, ColdThermometer> {
        let config = TuneConfig {
            templates_root: dir.join("templates"),
            work_dir: dir.join("work"),
            gate: ThermalGate::new(Duration::from_millis(1), Duration::from_millis(50)),
        };
        TuneDriver::new(RampExecutor { calls: 0 }, ColdThermometer, compiler, config)
    }

    #[test]
    fn test_fuzz_terminates_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let session = make_session(dir.path(), "fuzz", true);
        let mut driver = make_driver(dir.path(), stub_compiler());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let outcome = driver
            .run_session_with_budget("session", &session, Duration::from_millis(100), &mut rng)
            .unwrap();

        assert!(outcome.iterations >= 1);
        // The executor ramps, so the last trial is the best
        assert_eq!(outcome.best_value, outcome.iterations as f64);

        let log = fs::read_to_string(dir.path().join("tuning.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len() as u64, outcome.iterations + 1);
        assert!(lines[0].starts_with("Iterations"));

        let max = fs::read_to_string(dir.path().join("max.txt")).unwrap();
        assert!(max.starts_with("Max time"));
    }

    #[test]
    fn test_bayesian_seed_iterations_precede_deadline_check() {
        let dir = tempfile::tempdir().unwrap();
        let session = make_session(dir.path(), "bayesian", true);
        let mut driver = make_driver(dir.path(), stub_compiler());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        // A zero budget is already expired: only the seed samples run.
        let outcome = driver
            .run_session_with_budget("session", &session, Duration::ZERO, &mut rng)
            .unwrap();

        assert_eq!(outcome.iterations, INIT_POINTS);
        let log = fs::read_to_string(dir.path().join("tuning.log")).unwrap();
        assert_eq!(log.lines().count() as u64, INIT_POINTS + 1);
    }

    #[test]
    fn test_bayesian_without_template_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = make_session(dir.path(), "bayesian", false);
        let mut driver = make_driver(dir.path(), stub_compiler());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let err = driver
            .run_session_with_budget("session", &session, Duration::ZERO, &mut rng)
            .unwrap_err();
        assert!(matches!(err, HavocError::Config(_)));
    }

    #[test]
    fn test_build_failure_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let session = make_session(dir.path(), "fuzz", true);
        let mut driver = make_driver(dir.path(), failing_compiler());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let outcome = driver
            .run_session_with_budget("session", &session, Duration::from_millis(50), &mut rng)
            .unwrap();

        // Every sample failed to build, yet the loop ran to the deadline
        assert!(outcome.iterations >= 1);
        assert_eq!(outcome.best_value, 0.0);
        let log = fs::read_to_string(dir.path().join("tuning.log")).unwrap();
        assert!(log.contains("skipped"));
    }

    #[test]
    fn test_unpinned_fuzz_explores_known_templates() {
        let dir = tempfile::tempdir().unwrap();
        // Lay out the known template set under templates/
        for name in ["cache", "mem_thrashing", "pipeline_stress", "system_calls"] {
            let template_dir = dir.path().join("templates").join(name);
            fs::create_dir_all(&template_dir).unwrap();
            fs::write(
                template_dir.join(format!("template_{}.c", template_name_stem(name))),
                "int main(void) { return 0; }\n",
            )
            .unwrap();
            fs::write(
                template_dir.join("parameters.json"),
                r#"{"DEFINES": {"N": {"type": "int", "range": [1, 8]}}}"#,
            )
            .unwrap();
        }
        let session = make_session(dir.path(), "fuzz", false);
        let mut driver = make_driver(dir.path(), stub_compiler());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let outcome = driver
            .run_session_with_budget("session", &session, Duration::from_millis(100), &mut rng)
            .unwrap();

        assert!(outcome.iterations >= 1);
        assert!(outcome.best_value > 0.0);
    }

    fn template_name_stem(name: &str) -> &str {
        match name {
            "cache" => "cache_stress",
            other => other,
        }
    }

    #[test]
    fn test_artifacts_disposed_after_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let session = make_session(dir.path(), "fuzz", true);
        let mut driver = make_driver(dir.path(), stub_compiler());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        driver
            .run_session_with_budget("session", &session, Duration::from_millis(50), &mut rng)
            .unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("work"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .collect();
        assert!(leftovers.is_empty(), "artifacts must not accumulate");
    }
}
