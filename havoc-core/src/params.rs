//! Parameter spaces for configurable enemy templates
//!
//! Each enemy template ships with a side-car JSON description listing
//! the symbolic constants it accepts, their types and valid ranges.
//! The space supports uniform random sampling (fuzz search) and exposes
//! bounds for optimizer-guided search.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{HavocError, Result};

/// Declared type of a template parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Int,
    Float,
}

/// Declared range of one template parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub range: [f64; 2],
}

impl ParamSpec {
    /// Integer parameter over `[min, max)`
    pub fn int(min: i64, max: i64) -> Self {
        Self {
            kind: ParamKind::Int,
            range: [min as f64, max as f64],
        }
    }

    /// Real parameter over `[min, max)`
    pub fn float(min: f64, max: f64) -> Self {
        Self {
            kind: ParamKind::Float,
            range: [min, max],
        }
    }

    pub fn min(&self) -> f64 {
        self.range[0]
    }

    pub fn max(&self) -> f64 {
        self.range[1]
    }
}

/// A concrete parameter value, typed per its declaration
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    /// Numeric view, used when feeding values back to an optimizer
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A concrete assignment of values to parameter names
pub type ParamAssignment = BTreeMap<String, ParamValue>;

/// Render an assignment the way the tuning log expects: `A: 1 B: 0.5`
pub fn format_assignment(assignment: &ParamAssignment) -> String {
    assignment
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The declared parameters of one enemy template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSpace {
    defines: BTreeMap<String, ParamSpec>,
}

impl ParameterSpace {
    /// Build a space directly from parameter declarations
    pub fn from_defines(defines: BTreeMap<String, ParamSpec>) -> Self {
        Self { defines }
    }

    /// Load a space from a template's side-car description.
    ///
    /// The file is a JSON object whose `DEFINES` key maps parameter
    /// names to `{type, range}` declarations.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&text)?;
        let defines = document.get("DEFINES").ok_or_else(|| {
            HavocError::Config(format!("no DEFINES object in {}", path.display()))
        })?;
        let defines: BTreeMap<String, ParamSpec> = serde_json::from_value(defines.clone())?;
        Ok(Self { defines })
    }

    /// Parameter declarations, name-ordered
    pub fn defines(&self) -> &BTreeMap<String, ParamSpec> {
        &self.defines
    }

    pub fn len(&self) -> usize {
        self.defines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Draw a uniformly random value for every declared parameter.
    ///
    /// Integer parameters draw from the half-open integer range,
    /// real parameters from the continuous uniform range.
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> ParamAssignment {
        self.defines
            .iter()
            .map(|(name, spec)| {
                let value = match spec.kind {
                    ParamKind::Int => {
                        let lo = spec.min() as i64;
                        let hi = spec.max() as i64;
                        if hi <= lo {
                            ParamValue::Int(lo)
                        } else {
                            ParamValue::Int(rng.gen_range(lo..hi))
                        }
                    }
                    ParamKind::Float => ParamValue::Float(rng.gen_range(spec.min()..spec.max())),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Cast raw numeric values to their declared types.
    ///
    /// Optimizers propose plain floats; integer parameters are truncated
    /// to integers here. A name with no declaration fails with a config
    /// error.
    pub fn validate_and_coerce(&self, raw: &BTreeMap<String, f64>) -> Result<ParamAssignment> {
        raw.iter()
            .map(|(name, &value)| {
                let spec = self.defines.get(name).ok_or_else(|| {
                    HavocError::Config(format!("unknown parameter '{}'", name))
                })?;
                let coerced = match spec.kind {
                    ParamKind::Int => ParamValue::Int(value as i64),
                    ParamKind::Float => ParamValue::Float(value),
                };
                Ok((name.clone(), coerced))
            })
            .collect()
    }

    /// Name -> (min, max) bounds for optimizer consumption
    pub fn bounds(&self) -> BTreeMap<String, (f64, f64)> {
        self.defines
            .iter()
            .map(|(name, spec)| (name.clone(), (spec.min(), spec.max())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn make_space() -> ParameterSpace {
        let mut defines = BTreeMap::new();
        defines.insert("ITERS".to_string(), ParamSpec::int(0, 10));
        defines.insert("RATIO".to_string(), ParamSpec::float(0.0, 1.0));
        ParameterSpace::from_defines(defines)
    }

    #[test]
    fn test_int_draws_stay_in_half_open_range() {
        let space = ParameterSpace::from_defines(
            [("N".to_string(), ParamSpec::int(0, 10))].into_iter().collect(),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut seen = std::collections::BTreeSet::new();

        for _ in 0..10_000 {
            let assignment = space.sample_random(&mut rng);
            match assignment["N"] {
                ParamValue::Int(v) => {
                    assert!((0..10).contains(&v));
                    seen.insert(v);
                }
                ParamValue::Float(_) => panic!("int parameter drew a float"),
            }
        }
        // A uniform draw over ten values must produce more than one of them
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_float_draws_stay_in_range() {
        let space = ParameterSpace::from_defines(
            [("X".to_string(), ParamSpec::float(0.0, 1.0))].into_iter().collect(),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..10_000 {
            let assignment = space.sample_random(&mut rng);
            let x = assignment["X"].as_f64();
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn test_validate_and_coerce_casts_to_declared_types() {
        let space = make_space();
        let raw: BTreeMap<String, f64> =
            [("ITERS".to_string(), 4.7), ("RATIO".to_string(), 0.25)].into_iter().collect();

        let assignment = space.validate_and_coerce(&raw).unwrap();
        assert_eq!(assignment["ITERS"], ParamValue::Int(4));
        assert_eq!(assignment["RATIO"], ParamValue::Float(0.25));
    }

    #[test]
    fn test_validate_rejects_unknown_parameter() {
        let space = make_space();
        let raw: BTreeMap<String, f64> = [("BOGUS".to_string(), 1.0)].into_iter().collect();

        let err = space.validate_and_coerce(&raw).unwrap_err();
        assert!(matches!(err, HavocError::Config(_)));
    }

    #[test]
    fn test_bounds_expose_declared_ranges() {
        let bounds = make_space().bounds();
        assert_eq!(bounds["ITERS"], (0.0, 10.0));
        assert_eq!(bounds["RATIO"], (0.0, 1.0));
    }

    #[test]
    fn test_from_file_reads_defines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters.json");
        std::fs::write(
            &path,
            r#"{"DEFINES": {"SIZE": {"type": "int", "range": [16, 4096]}}}"#,
        )
        .unwrap();

        let space = ParameterSpace::from_file(&path).unwrap();
        assert_eq!(space.len(), 1);
        assert_eq!(space.defines()["SIZE"].kind, ParamKind::Int);
    }

    #[test]
    fn test_from_file_without_defines_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parameters.json");
        std::fs::write(&path, r#"{"OTHER": {}}"#).unwrap();

        let err = ParameterSpace::from_file(&path).unwrap_err();
        assert!(matches!(err, HavocError::Config(_)));
    }

    #[test]
    fn test_format_assignment_is_name_ordered() {
        let assignment: ParamAssignment = [
            ("B".to_string(), ParamValue::Float(0.5)),
            ("A".to_string(), ParamValue::Int(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(format_assignment(&assignment), "A: 3 B: 0.5");
    }
}
