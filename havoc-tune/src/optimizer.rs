//! Pluggable proposal engines for the Bayesian strategy
//!
//! The tuning driver only ever talks to the [`Optimizer`] trait: feed
//! observed (point, value) pairs in, get the next proposal out. Any
//! optimization library can be substituted behind it without touching
//! the driver.

use std::collections::BTreeMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Black-box maximizer over a box-bounded parameter space
pub trait Optimizer {
    /// Propose the next point to evaluate
    fn propose(&mut self, rng: &mut ChaCha8Rng) -> BTreeMap<String, f64>;

    /// Record an observed objective value for a point
    fn observe(&mut self, point: &BTreeMap<String, f64>, value: f64);

    /// Best observation so far
    fn best(&self) -> Option<(BTreeMap<String, f64>, f64)>;
}

/// Kernel-regression surrogate with an upper-confidence-bound
/// acquisition.
///
/// Predictions are a Gaussian-kernel weighted mean of the observed
/// values; the uncertainty term shrinks with local observation density,
/// so the acquisition `mu + kappa * sigma` trades exploitation against
/// exploration the way the coefficient dictates. Proposals maximize the
/// acquisition over a batch of random candidates.
pub struct BayesianOptimizer {
    names: Vec<String>,
    lows: Vec<f64>,
    spans: Vec<f64>,
    kappa: f64,
    candidates: usize,
    bandwidth: f64,
    points: Vec<Vec<f64>>,
    values: Vec<f64>,
    best_index: Option<usize>,
}

impl BayesianOptimizer {
    pub fn new(bounds: BTreeMap<String, (f64, f64)>, kappa: f64) -> Self {
        let mut names = Vec::with_capacity(bounds.len());
        let mut lows = Vec::with_capacity(bounds.len());
        let mut spans = Vec::with_capacity(bounds.len());
        for (name, (low, high)) in bounds {
            names.push(name);
            lows.push(low);
            spans.push((high - low).max(f64::MIN_POSITIVE));
        }
        Self {
            names,
            lows,
            spans,
            kappa,
            candidates: 500,
            bandwidth: 0.15,
            points: Vec::new(),
            values: Vec::new(),
            best_index: None,
        }
    }

    /// Override the acquisition candidate batch size
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    fn normalize(&self, point: &BTreeMap<String, f64>) -> Vec<f64> {
        self.names
            .iter()
            .enumerate()
            .map(|(dim, name)| {
                let raw = point.get(name).copied().unwrap_or(self.lows[dim]);
                (raw - self.lows[dim]) / self.spans[dim]
            })
            .collect()
    }

    fn denormalize(&self, unit: &[f64]) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .enumerate()
            .map(|(dim, name)| (name.clone(), self.lows[dim] + unit[dim] * self.spans[dim]))
            .collect()
    }

    fn random_unit(&self, rng: &mut ChaCha8Rng) -> Vec<f64> {
        (0..self.names.len()).map(|_| rng.gen_range(0.0..1.0)).collect()
    }

    fn acquisition(&self, unit: &[f64]) -> f64 {
        let dims = unit.len().max(1) as f64;
        let h2 = self.bandwidth * self.bandwidth;

        let mut weight_sum = 0.0;
        let mut weighted_values = 0.0;
        for (point, &value) in self.points.iter().zip(&self.values) {
            let distance2: f64 = point
                .iter()
                .zip(unit)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                / dims;
            let weight = (-distance2 / (2.0 * h2)).exp();
            weight_sum += weight;
            weighted_values += weight * value;
        }

        let count = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / count;
        let spread = (self.values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count)
            .sqrt()
            .max(1e-6);

        let mu = if weight_sum > 1e-12 {
            weighted_values / weight_sum
        } else {
            mean
        };
        let sigma = spread / (1.0 + weight_sum);
        mu + self.kappa * sigma
    }
}

impl Optimizer for BayesianOptimizer {
    fn propose(&mut self, rng: &mut ChaCha8Rng) -> BTreeMap<String, f64> {
        if self.values.is_empty() {
            let unit = self.random_unit(rng);
            return self.denormalize(&unit);
        }

        let mut best_unit = self.random_unit(rng);
        let mut best_score = self.acquisition(&best_unit);
        for _ in 1..self.candidates {
            let unit = self.random_unit(rng);
            let score = self.acquisition(&unit);
            if score > best_score {
                best_score = score;
                best_unit = unit;
            }
        }
        self.denormalize(&best_unit)
    }

    fn observe(&mut self, point: &BTreeMap<String, f64>, value: f64) {
        self.points.push(self.normalize(point));
        self.values.push(value);
        let better = match self.best_index {
            Some(index) => value > self.values[index],
            None => true,
        };
        if better {
            self.best_index = Some(self.values.len() - 1);
        }
    }

    fn best(&self) -> Option<(BTreeMap<String, f64>, f64)> {
        self.best_index
            .map(|index| (self.denormalize(&self.points[index]), self.values[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn bounds_1d() -> BTreeMap<String, (f64, f64)> {
        [("X".to_string(), (0.0, 10.0))].into_iter().collect()
    }

    #[test]
    fn test_proposals_respect_bounds() {
        let mut optimizer = BayesianOptimizer::new(bounds_1d(), 2.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..100 {
            let point = optimizer.propose(&mut rng);
            let x = point["X"];
            assert!((0.0..=10.0).contains(&x));
            optimizer.observe(&point, -x);
        }
    }

    #[test]
    fn test_best_tracks_maximum() {
        let mut optimizer = BayesianOptimizer::new(bounds_1d(), 2.0);

        optimizer.observe(&[("X".to_string(), 2.0)].into_iter().collect(), 1.0);
        optimizer.observe(&[("X".to_string(), 8.0)].into_iter().collect(), 5.0);
        optimizer.observe(&[("X".to_string(), 4.0)].into_iter().collect(), 3.0);

        let (point, value) = optimizer.best().unwrap();
        assert_eq!(value, 5.0);
        assert!((point["X"] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_pure_exploitation_prefers_observed_peak() {
        // With kappa = 0 the acquisition is the surrogate mean, which
        // must peak near the best observation.
        let mut optimizer = BayesianOptimizer::new(bounds_1d(), 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        optimizer.observe(&[("X".to_string(), 8.0)].into_iter().collect(), 10.0);
        optimizer.observe(&[("X".to_string(), 2.0)].into_iter().collect(), 1.0);

        let proposal = optimizer.propose(&mut rng);
        assert!(proposal["X"] > 5.0);
    }
}
