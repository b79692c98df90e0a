//! Tuning session configuration

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use havoc_core::{EnemyTemplate, HavocError, Result};

/// Search strategy for a tuning session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Fuzz,
    Bayesian,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Fuzz => write!(f, "fuzz"),
            Method::Bayesian => write!(f, "bayesian"),
        }
    }
}

/// One named tuning session.
///
/// With no `template_file`/`template_data` pair the search also
/// explores which known template each enemy core runs, not only its
/// parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct TuningSession {
    pub sut: String,
    /// Number of enemy cores to load
    pub cores: u32,
    pub method: Method,
    /// Exploration coefficient for the Bayesian strategy
    pub kappa: u32,
    /// Convergence log (tab-separated, truncated at session start)
    pub log_file: PathBuf,
    /// Best-found assignment and value (truncated at session start)
    pub max_file: PathBuf,
    /// Wall-clock search budget in minutes
    pub training_time: u64,
    pub max_temperature: u32,
    /// Seconds between thermal-gate polls
    pub cooldown_time: u64,
    #[serde(default)]
    pub template_file: Option<PathBuf>,
    #[serde(default)]
    pub template_data: Option<PathBuf>,
}

impl TuningSession {
    /// Validate one manifest entry
    pub fn from_value(name: &str, value: &serde_json::Value) -> Result<Self> {
        let session: TuningSession = serde_json::from_value(value.clone())
            .map_err(|e| HavocError::Config(format!("tuning session '{}': {}", name, e)))?;

        if session.template_file.is_some() != session.template_data.is_some() {
            return Err(HavocError::Config(format!(
                "tuning session '{}': template_file and template_data must be given together",
                name
            )));
        }
        Ok(session)
    }

    /// The explicitly pinned template, if one was configured
    pub fn template(&self) -> Option<EnemyTemplate> {
        match (&self.template_file, &self.template_data) {
            (Some(file), Some(data)) => {
                let name = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "template".to_string());
                Some(EnemyTemplate::new(name, file.clone(), data.clone()))
            }
            _ => None,
        }
    }
}

/// All tuning sessions of one run
#[derive(Clone, Debug, Default)]
pub struct TuningManifest {
    sessions: BTreeMap<String, TuningSession>,
}

impl TuningManifest {
    /// Load a session manifest file.
    ///
    /// Entries that fail validation are reported and skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&text)?;
        let object = document.as_object().ok_or_else(|| {
            HavocError::Config(format!("{} is not a JSON object", path.display()))
        })?;

        let mut sessions = BTreeMap::new();
        for (name, value) in object {
            match TuningSession::from_value(name, value) {
                Ok(session) => {
                    sessions.insert(name.clone(), session);
                }
                Err(e) => tracing::warn!("skipping tuning session '{}': {}", name, e),
            }
        }
        Ok(Self { sessions })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TuningSession)> {
        self.sessions
            .iter()
            .map(|(name, session)| (name.as_str(), session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_session() -> serde_json::Value {
        json!({
            "sut": "victim",
            "cores": 2,
            "method": "fuzz",
            "kappa": 5,
            "log_file": "tuning.log",
            "max_file": "max.txt",
            "training_time": 30,
            "max_temperature": 70,
            "cooldown_time": 60
        })
    }

    #[test]
    fn test_session_parses() {
        let session = TuningSession::from_value("s", &full_session()).unwrap();
        assert_eq!(session.sut, "victim");
        assert_eq!(session.method, Method::Fuzz);
        assert_eq!(session.training_time, 30);
        assert!(session.template().is_none());
    }

    #[test]
    fn test_missing_field_is_config_error() {
        let mut value = full_session();
        value.as_object_mut().unwrap().remove("kappa");
        let err = TuningSession::from_value("s", &value).unwrap_err();
        assert!(matches!(err, HavocError::Config(_)));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let mut value = full_session();
        value["method"] = json!("annealing");
        assert!(TuningSession::from_value("s", &value).is_err());
    }

    #[test]
    fn test_template_pair_must_be_complete() {
        let mut value = full_session();
        value["template_file"] = json!("templates/cache/template_cache_stress.c");
        let err = TuningSession::from_value("s", &value).unwrap_err();
        assert!(matches!(err, HavocError::Config(_)));

        value["template_data"] = json!("templates/cache/parameters.json");
        let session = TuningSession::from_value("s", &value).unwrap();
        let template = session.template().unwrap();
        assert_eq!(template.name, "template_cache_stress");
    }
}
