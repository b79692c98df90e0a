//! Per-configuration result documents
//!
//! Results are built as immutable values and serialized to the JSON
//! layout of the final result document: per-series `time_list`,
//! `time_avg`, `time_std` keys (with a `_baseline` suffix for the
//! baseline series) and their `temp_*` counterparts when every trial
//! reported a temperature.

use serde_json::{json, Map, Value};

use havoc_core::TrialSeries;

/// One baseline-vs-treatment comparison for a single configuration
#[derive(Clone, Debug)]
pub struct ConfigurationResult {
    pub sut: String,
    /// Stress program or mapping descriptor
    pub stress: String,
    /// Number of enemy cores in the treatment
    pub cores: u32,
    pub iterations: u32,
    pub baseline: TrialSeries,
    pub treatment: TrialSeries,
}

impl ConfigurationResult {
    /// Serialize to the result-document layout
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("sut".to_string(), json!(self.sut));
        map.insert("stress".to_string(), json!(self.stress));
        map.insert("cores".to_string(), json!(self.cores));
        map.insert("iterations".to_string(), json!(self.iterations));
        insert_series(&mut map, &self.baseline, "_baseline");
        insert_series(&mut map, &self.treatment, "");
        Value::Object(map)
    }
}

/// Outcome of a ranked-list combinatorial search
#[derive(Clone, Debug)]
pub struct RankedResult {
    pub sut: String,
    pub ranked_list: Vec<String>,
    pub cores: u32,
    pub iterations: u32,
    pub baseline: TrialSeries,
    /// (assignment descriptor, mean time), ascending by mean time
    table: Vec<(String, f64)>,
}

impl RankedResult {
    /// Build a ranked result; the table is sorted ascending by mean time.
    pub fn new(
        sut: String,
        ranked_list: Vec<String>,
        cores: u32,
        iterations: u32,
        baseline: TrialSeries,
        mut table: Vec<(String, f64)>,
    ) -> Self {
        table.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            sut,
            ranked_list,
            cores,
            iterations,
            baseline,
            table,
        }
    }

    /// The ranking, ascending by mean time
    pub fn table(&self) -> &[(String, f64)] {
        &self.table
    }

    /// Serialize to the result-document layout
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("sut".to_string(), json!(self.sut));
        map.insert("stress".to_string(), json!(self.ranked_list.join(",")));
        map.insert("cores".to_string(), json!(self.cores));
        map.insert("iterations".to_string(), json!(self.iterations));
        map.insert(
            "time_avg_baseline".to_string(),
            json!(self.baseline.time_mean()),
        );
        map.insert(
            "ranked_list".to_string(),
            json!(self
                .table
                .iter()
                .map(|(desc, mean)| json!([desc, mean]))
                .collect::<Vec<_>>()),
        );
        Value::Object(map)
    }
}

fn insert_series(map: &mut Map<String, Value>, series: &TrialSeries, suffix: &str) {
    map.insert(format!("time_list{}", suffix), json!(series.times()));
    map.insert(format!("time_avg{}", suffix), json!(series.time_mean()));
    map.insert(format!("time_std{}", suffix), json!(series.time_std()));

    if let Some(temps) = series.temperatures() {
        map.insert(format!("temp_list{}", suffix), json!(temps));
        map.insert(format!("temp_avg{}", suffix), json!(series.temp_mean()));
        map.insert(format!("temp_std{}", suffix), json!(series.temp_std()));
    }
}
