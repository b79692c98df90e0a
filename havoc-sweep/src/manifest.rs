//! Experiment manifest - declarative descriptions of batch experiments
//!
//! The manifest is a JSON object mapping experiment names to specs.
//! A spec's kind is determined by which of `stress`, `mapping` or
//! `ranked_list` it carries; the choice is validated exactly once at
//! load time and represented as a tagged union from then on.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use havoc_core::{CoreAssignment, HavocError, Result};

/// A validated experiment specification
#[derive(Clone, Debug, PartialEq)]
pub enum ExperimentSpec {
    /// Cartesian sweep over SUTs, stress programs and core counts
    Sweep(SweepSpec),
    /// Baseline vs. one explicit core mapping
    Mapping(MappingSpec),
    /// Combinatorial search over assignments drawn from a ranked list
    Ranked(RankedSpec),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SweepSpec {
    pub suts: Vec<String>,
    pub stress: Vec<String>,
    pub cores: Vec<u32>,
    pub iterations: u32,
    pub max_temperature: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MappingSpec {
    pub sut: String,
    pub mapping: CoreAssignment,
    pub iterations: u32,
    pub max_temperature: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankedSpec {
    pub sut: String,
    pub ranked_list: Vec<String>,
    pub cores: u32,
    pub iterations: u32,
    pub max_temperature: u32,
}

impl ExperimentSpec {
    /// Validate one manifest entry.
    ///
    /// Exactly one of `stress`/`mapping`/`ranked_list` must be present;
    /// `sut`, `iterations` and `max_temperature` are required. `sut`
    /// and `cores` accept a scalar or a list.
    pub fn from_value(name: &str, value: &serde_json::Value) -> Result<Self> {
        let raw: RawSpec = serde_json::from_value(value.clone())?;

        let kinds = [
            raw.stress.is_some(),
            raw.mapping.is_some(),
            raw.ranked_list.is_some(),
        ];
        if kinds.iter().filter(|&&set| set).count() != 1 {
            return Err(HavocError::Config(format!(
                "experiment '{}': exactly one of stress, mapping or ranked_list must be given",
                name
            )));
        }

        let suts = require(name, "sut", raw.sut)?.into_vec();
        if suts.is_empty() {
            return Err(missing(name, "sut"));
        }
        let iterations = require(name, "iterations", raw.iterations)?;
        let max_temperature = require(name, "max_temperature", raw.max_temperature)?;

        if let Some(stress) = raw.stress {
            let stress = stress.into_vec();
            if stress.is_empty() {
                return Err(missing(name, "stress"));
            }
            let cores = require(name, "cores", raw.cores)?.into_vec();
            if cores.is_empty() {
                return Err(missing(name, "cores"));
            }
            return Ok(ExperimentSpec::Sweep(SweepSpec {
                suts,
                stress,
                cores,
                iterations,
                max_temperature,
            }));
        }

        let sut = single_sut(name, suts)?;

        if let Some(mapping) = raw.mapping {
            return Ok(ExperimentSpec::Mapping(MappingSpec {
                sut,
                mapping: mapping.into(),
                iterations,
                max_temperature,
            }));
        }

        let Some(ranked_list) = raw.ranked_list else {
            return Err(missing(name, "ranked_list"));
        };
        if ranked_list.is_empty() {
            return Err(missing(name, "ranked_list"));
        }
        let cores = single_core(name, require(name, "cores", raw.cores)?.into_vec())?;
        Ok(ExperimentSpec::Ranked(RankedSpec {
            sut,
            ranked_list,
            cores,
            iterations,
            max_temperature,
        }))
    }

    pub fn iterations(&self) -> u32 {
        match self {
            ExperimentSpec::Sweep(s) => s.iterations,
            ExperimentSpec::Mapping(s) => s.iterations,
            ExperimentSpec::Ranked(s) => s.iterations,
        }
    }

    pub fn max_temperature(&self) -> u32 {
        match self {
            ExperimentSpec::Sweep(s) => s.max_temperature,
            ExperimentSpec::Mapping(s) => s.max_temperature,
            ExperimentSpec::Ranked(s) => s.max_temperature,
        }
    }
}

/// All experiments of one run, loaded once and immutable thereafter
#[derive(Clone, Debug, Default)]
pub struct ExperimentManifest {
    entries: BTreeMap<String, ExperimentSpec>,
}

impl ExperimentManifest {
    /// Load a manifest file.
    ///
    /// Entries that fail validation are reported and skipped; a bad
    /// entry never aborts the rest of the manifest.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&text)?;
        let object = document.as_object().ok_or_else(|| {
            HavocError::Config(format!("{} is not a JSON object", path.display()))
        })?;

        let mut entries = BTreeMap::new();
        for (name, value) in object {
            match ExperimentSpec::from_value(name, value) {
                Ok(spec) => {
                    entries.insert(name.clone(), spec);
                }
                Err(e) => tracing::warn!("skipping experiment '{}': {}", name, e),
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExperimentSpec> {
        self.entries.get(name)
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExperimentSpec)> {
        self.entries.iter().map(|(name, spec)| (name.as_str(), spec))
    }
}

impl FromIterator<(String, ExperimentSpec)> for ExperimentManifest {
    fn from_iter<I: IntoIterator<Item = (String, ExperimentSpec)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Raw deserialization
// ============================================================================

/// A scalar-or-list manifest field, normalized to a list
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Manifest entry before kind validation
#[derive(Debug, Deserialize)]
struct RawSpec {
    sut: Option<OneOrMany<String>>,
    stress: Option<OneOrMany<String>>,
    mapping: Option<BTreeMap<u32, String>>,
    ranked_list: Option<Vec<String>>,
    cores: Option<OneOrMany<u32>>,
    iterations: Option<u32>,
    max_temperature: Option<u32>,
}

fn missing(name: &str, field: &str) -> HavocError {
    HavocError::Config(format!("experiment '{}': missing {}", name, field))
}

fn require<T>(name: &str, field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| missing(name, field))
}

fn single_sut(name: &str, mut suts: Vec<String>) -> Result<String> {
    if suts.len() != 1 {
        return Err(HavocError::Config(format!(
            "experiment '{}': this experiment kind takes a single sut",
            name
        )));
    }
    Ok(suts.remove(0))
}

fn single_core(name: &str, cores: Vec<u32>) -> Result<u32> {
    if cores.len() != 1 {
        return Err(HavocError::Config(format!(
            "experiment '{}': ranked_list takes a single core count",
            name
        )));
    }
    Ok(cores[0])
}
