//! HAVOC Tune - Black-box enemy parameter tuning
//!
//! This crate searches the parameter space of configurable enemy
//! templates to maximize observed SUT degradation:
//! - Fuzz search: fresh uniformly-random parameters every iteration
//! - Bayesian search: optimizer-guided proposals behind a pluggable
//!   interface, seeded with random samples
//!
//! Both strategies run under a wall-clock budget with a thermal safety
//! gate before every trial, and log one convergence record per
//! iteration.

mod driver;
mod log;
mod optimizer;
mod session;

pub use driver::{EnemySetup, TuneConfig, TuneDriver, TuneOutcome, INIT_POINTS};
pub use log::{write_max_file, SearchLog, SearchRecord};
pub use optimizer::{BayesianOptimizer, Optimizer};
pub use session::{Method, TuningManifest, TuningSession};
