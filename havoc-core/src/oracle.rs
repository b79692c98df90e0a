//! Trial oracle - thermal gate plus sequential trial execution
//!
//! The oracle wraps the external trial executor. Before every trial it
//! waits for the machine to cool below the experiment's temperature
//! ceiling, then runs the SUT with the given enemy assignment and
//! aggregates repeated trials into a series. Iterations within one
//! configuration are never parallelized: they compete for the same
//! cores and the same thermal envelope.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HavocError, Result};
use crate::series::{TrialSample, TrialSeries};
use crate::workload::CoreAssignment;

/// The single opaque call into the external trial executor
pub trait TrialExecutor {
    /// Launch the SUT with the given enemy assignment, block until it
    /// finishes, and report execution time and temperature.
    fn run(&mut self, sut: &str, assignment: &CoreAssignment) -> Result<TrialSample>;
}

/// A source of ambient temperature readings
pub trait TemperatureSource {
    fn read_celsius(&mut self) -> Result<f64>;
}

/// Bounded cooldown wait performed before every trial.
///
/// The wait is a poll-and-sleep loop, not a busy spin, and it is
/// bounded: if the temperature never clears the ceiling within
/// `max_wait` the gate fails instead of hanging the search loop.
#[derive(Clone, Copy, Debug)]
pub struct ThermalGate {
    /// Sleep between temperature polls
    pub poll_interval: Duration,
    /// Ceiling on total wait time before giving up
    pub max_wait: Duration,
}

impl Default for ThermalGate {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_wait: Duration::from_secs(600),
        }
    }
}

impl ThermalGate {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    /// Block until `source` reports at or below `ceiling` degrees.
    pub fn wait_until_cool<T: TemperatureSource>(&self, source: &mut T, ceiling: f64) -> Result<()> {
        let started = Instant::now();
        loop {
            let current = source.read_celsius()?;
            if current <= ceiling {
                return Ok(());
            }
            if started.elapsed() >= self.max_wait {
                return Err(HavocError::ThermalTimeout {
                    ceiling,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tracing::debug!(
                "temperature {:.1} above ceiling {:.1}, cooling down",
                current,
                ceiling
            );
            thread::sleep(self.poll_interval);
        }
    }
}

/// Wraps an executor and a thermometer behind the thermal gate
pub struct Oracle<E, T> {
    executor: E,
    thermometer: T,
    gate: ThermalGate,
}

impl<E: TrialExecutor, T: TemperatureSource> Oracle<E, T> {
    pub fn new(executor: E, thermometer: T, gate: ThermalGate) -> Self {
        Self {
            executor,
            thermometer,
            gate,
        }
    }

    pub fn gate_mut(&mut self) -> &mut ThermalGate {
        &mut self.gate
    }

    /// One thermally-gated trial
    pub fn run_once(
        &mut self,
        sut: &str,
        assignment: &CoreAssignment,
        max_temperature: f64,
    ) -> Result<TrialSample> {
        self.gate.wait_until_cool(&mut self.thermometer, max_temperature)?;
        self.executor.run(sut, assignment)
    }

    /// `iterations` sequential trials aggregated into a series
    pub fn run_series(
        &mut self,
        sut: &str,
        assignment: &CoreAssignment,
        iterations: u32,
        max_temperature: f64,
    ) -> Result<TrialSeries> {
        let mut samples = Vec::with_capacity(iterations as usize);
        for iteration in 0..iterations {
            tracing::debug!(
                "trial {}/{}: sut={} enemies={}",
                iteration + 1,
                iterations,
                sut,
                assignment
            );
            samples.push(self.run_once(sut, assignment, max_temperature)?);
        }
        Ok(TrialSeries::new(samples))
    }
}

/// Executor that launches real processes.
///
/// Enemies are pinned to their cores with `taskset` and killed once the
/// SUT finishes; the SUT's wall-clock time is the trial time.
pub struct ProcessExecutor {
    thermometer: Option<ThermalZoneSource>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self { thermometer: None }
    }

    /// Attach a thermometer so samples carry a temperature reading
    pub fn with_thermometer(mut self, thermometer: ThermalZoneSource) -> Self {
        self.thermometer = Some(thermometer);
        self
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialExecutor for ProcessExecutor {
    fn run(&mut self, sut: &str, assignment: &CoreAssignment) -> Result<TrialSample> {
        let mut enemies = Vec::with_capacity(assignment.len());
        for (core, enemy) in assignment.iter() {
            let child = Command::new("taskset")
                .arg("-c")
                .arg(core.to_string())
                .arg(enemy)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
            enemies.push(child);
        }

        let started = Instant::now();
        let status = Command::new(sut)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let elapsed = started.elapsed().as_secs_f64();

        // Enemies run forever by construction; stop them before
        // inspecting the SUT's exit.
        for mut child in enemies {
            let _ = child.kill();
            let _ = child.wait();
        }

        let status = status?;
        if !status.success() {
            return Err(HavocError::Executor(format!(
                "{} exited with {}",
                sut, status
            )));
        }

        let temperature = match &mut self.thermometer {
            Some(source) => Some(source.read_celsius()?),
            None => None,
        };

        Ok(TrialSample {
            time: elapsed,
            temperature,
        })
    }
}

/// Reads a sysfs thermal zone (millidegrees Celsius)
pub struct ThermalZoneSource {
    path: PathBuf,
}

impl ThermalZoneSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ThermalZoneSource {
    fn default() -> Self {
        Self::new("/sys/class/thermal/thermal_zone0/temp")
    }
}

impl TemperatureSource for ThermalZoneSource {
    fn read_celsius(&mut self) -> Result<f64> {
        let raw = fs::read_to_string(&self.path)?;
        let millidegrees: f64 = raw.trim().parse().map_err(|_| {
            HavocError::Executor(format!(
                "unparsable temperature reading in {}",
                self.path.display()
            ))
        })?;
        Ok(millidegrees / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Thermometer scripted with a fixed sequence of readings;
    /// repeats the last one once exhausted.
    struct ScriptedThermometer {
        readings: Vec<f64>,
        next: usize,
        polls: u32,
    }

    impl ScriptedThermometer {
        fn new(readings: Vec<f64>) -> Self {
            Self {
                readings,
                next: 0,
                polls: 0,
            }
        }
    }

    impl TemperatureSource for ScriptedThermometer {
        fn read_celsius(&mut self) -> Result<f64> {
            self.polls += 1;
            let reading = self.readings[self.next.min(self.readings.len() - 1)];
            self.next += 1;
            Ok(reading)
        }
    }

    /// Executor that returns increasing times without touching processes
    struct CountingExecutor {
        calls: u32,
    }

    impl CountingExecutor {
        fn new() -> Self {
            Self { calls: 0 }
        }
    }

    impl TrialExecutor for CountingExecutor {
        fn run(&mut self, _sut: &str, _assignment: &CoreAssignment) -> Result<TrialSample> {
            self.calls += 1;
            Ok(TrialSample {
                time: self.calls as f64,
                temperature: Some(50.0),
            })
        }
    }

    fn fast_gate() -> ThermalGate {
        ThermalGate::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[test]
    fn test_gate_proceeds_once_cool() {
        let gate = fast_gate();
        let mut thermometer = ScriptedThermometer::new(vec![80.0, 75.0, 60.0]);

        gate.wait_until_cool(&mut thermometer, 70.0).unwrap();
        assert_eq!(thermometer.polls, 3);
    }

    #[test]
    fn test_gate_times_out_when_never_cooling() {
        let gate = ThermalGate::new(Duration::from_millis(1), Duration::from_millis(10));
        let mut thermometer = ScriptedThermometer::new(vec![90.0]);

        let err = gate.wait_until_cool(&mut thermometer, 70.0).unwrap_err();
        assert!(matches!(err, HavocError::ThermalTimeout { .. }));
    }

    #[test]
    fn test_gate_with_zero_wait_fails_immediately_on_hot() {
        let gate = ThermalGate::new(Duration::from_millis(1), Duration::ZERO);
        let mut thermometer = ScriptedThermometer::new(vec![90.0]);

        let err = gate.wait_until_cool(&mut thermometer, 70.0).unwrap_err();
        assert!(matches!(err, HavocError::ThermalTimeout { .. }));
        assert_eq!(thermometer.polls, 1);
    }

    #[test]
    fn test_run_series_is_sequential_and_complete() {
        let mut oracle = Oracle::new(
            CountingExecutor::new(),
            ScriptedThermometer::new(vec![40.0]),
            fast_gate(),
        );

        let series = oracle
            .run_series("sut", &CoreAssignment::empty(), 3, 70.0)
            .unwrap();

        assert_eq!(series.len(), 3);
        // Sequential execution preserves call order
        assert_eq!(series.times(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.temp_mean(), Some(50.0));
    }

    #[test]
    fn test_run_once_gates_before_executing() {
        let mut oracle = Oracle::new(
            CountingExecutor::new(),
            ScriptedThermometer::new(vec![90.0]),
            ThermalGate::new(Duration::from_millis(1), Duration::ZERO),
        );

        let err = oracle
            .run_once("sut", &CoreAssignment::empty(), 70.0)
            .unwrap_err();
        assert!(matches!(err, HavocError::ThermalTimeout { .. }));
    }
}
