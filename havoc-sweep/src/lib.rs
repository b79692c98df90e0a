//! HAVOC Sweep - Batch experiment driver
//!
//! This crate runs the experiments declared in a manifest:
//! - Stress sweeps (SUT x stress program x enemy core count)
//! - Mapping comparisons (baseline vs. an explicit core mapping)
//! - Ranked-list combinatorial searches
//!
//! Each configuration's result is written to its own temp file as soon
//! as it is computed, then the partial files are merged into one
//! result document at the end of the run.

mod driver;
mod manifest;
mod merge;
mod result;

pub use driver::{SweepConfig, SweepDriver};
pub use manifest::{ExperimentManifest, ExperimentSpec, MappingSpec, RankedSpec, SweepSpec};
pub use merge::{merge_dir, merge_values};
pub use result::{ConfigurationResult, RankedResult};
