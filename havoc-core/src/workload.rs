//! Core-to-enemy workload assignments

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An assignment of enemy programs to CPU core indices.
///
/// The empty assignment is the baseline: the SUT runs with no
/// interference. Core indices are kept sorted so that serialized
/// assignments and log lines are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreAssignment(BTreeMap<u32, String>);

impl CoreAssignment {
    /// The baseline assignment: no enemies
    pub fn empty() -> Self {
        Self::default()
    }

    /// Run `enemy` on cores `1..=cores`
    pub fn uniform(cores: u32, enemy: &str) -> Self {
        (1..=cores).map(|core| (core, enemy.to_string())).collect()
    }

    /// Place an enemy on one core
    pub fn assign(&mut self, core: u32, enemy: impl Into<String>) {
        self.0.insert(core, enemy.into());
    }

    /// Number of enemy cores
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the baseline (no enemies)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate (core index, enemy) pairs in core order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(&core, enemy)| (core, enemy.as_str()))
    }
}

impl From<BTreeMap<u32, String>> for CoreAssignment {
    fn from(map: BTreeMap<u32, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(u32, String)> for CoreAssignment {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CoreAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (core, enemy) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}:{}", core, enemy)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_baseline() {
        let assignment = CoreAssignment::empty();
        assert!(assignment.is_empty());
        assert_eq!(assignment.to_string(), "none");
    }

    #[test]
    fn test_uniform_covers_cores() {
        let assignment = CoreAssignment::uniform(3, "cache_enemy");
        assert_eq!(assignment.len(), 3);
        let cores: Vec<u32> = assignment.iter().map(|(core, _)| core).collect();
        assert_eq!(cores, vec![1, 2, 3]);
        assert!(assignment.iter().all(|(_, enemy)| enemy == "cache_enemy"));
    }

    #[test]
    fn test_display_is_core_ordered() {
        let mut assignment = CoreAssignment::empty();
        assignment.assign(2, "b");
        assignment.assign(1, "a");
        assert_eq!(assignment.to_string(), "1:a 2:b");
    }

    #[test]
    fn test_deserialize_from_json_object() {
        let assignment: CoreAssignment =
            serde_json::from_str(r#"{"1": "cache", "2": "mem"}"#).unwrap();
        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment.to_string(), "1:cache 2:mem");
    }
}
