//! Trial samples and aggregated series statistics

/// One timed execution of the SUT, optionally with a temperature reading.
///
/// Ephemeral: trials are never persisted individually, only as members
/// of a [`TrialSeries`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrialSample {
    /// Wall-clock execution time of the SUT in seconds
    pub time: f64,
    /// Temperature reported after the run, in degrees Celsius
    pub temperature: Option<f64>,
}

impl TrialSample {
    /// Create a sample with no temperature reading
    pub fn timed(time: f64) -> Self {
        Self {
            time,
            temperature: None,
        }
    }
}

/// Ordered sequence of trials for one configuration.
///
/// Immutable once built; statistics are derived on demand.
#[derive(Clone, Debug, Default)]
pub struct TrialSeries {
    samples: Vec<TrialSample>,
}

impl TrialSeries {
    /// Build a series from collected samples
    pub fn new(samples: Vec<TrialSample>) -> Self {
        Self { samples }
    }

    /// Number of trials in the series
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series holds no trials
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples, in execution order
    pub fn samples(&self) -> &[TrialSample] {
        &self.samples
    }

    /// Execution times, in execution order
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Temperatures, present only if every trial reported one
    pub fn temperatures(&self) -> Option<Vec<f64>> {
        if self.samples.is_empty() {
            return None;
        }
        self.samples.iter().map(|s| s.temperature).collect()
    }

    /// Mean execution time
    pub fn time_mean(&self) -> f64 {
        mean(&self.times())
    }

    /// Population standard deviation of execution time
    pub fn time_std(&self) -> f64 {
        std_dev(&self.times())
    }

    /// Mean temperature, if every trial reported one
    pub fn temp_mean(&self) -> Option<f64> {
        self.temperatures().map(|t| mean(&t))
    }

    /// Population standard deviation of temperature, if available
    pub fn temp_std(&self) -> Option<f64> {
        self.temperatures().map(|t| std_dev(&t))
    }
}

/// Arithmetic mean (0.0 for an empty slice)
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation (0.0 for an empty slice)
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
