//! Convergence log and max-value file
//!
//! The log is a tab-separated append-only file with one row per search
//! iteration; it forms the convergence trace of a tuning session.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use havoc_core::Result;

/// One search iteration's entry in the convergence trace
#[derive(Clone, Debug)]
pub struct SearchRecord {
    pub iteration: u64,
    /// Seconds since the session started
    pub elapsed_secs: u64,
    /// Best objective value found so far
    pub best: f64,
    /// This iteration's value; `None` for a skipped sample
    pub current: Option<f64>,
    /// Rendered parameter assignment
    pub params: String,
}

/// Append-only tab-separated convergence log
pub struct SearchLog {
    file: File,
    path: PathBuf,
}

impl SearchLog {
    /// Truncate `path` and write the header
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)?;
        writeln!(
            file,
            "Iterations\tTraining Time\tMax value found\tCurrent value\tParams"
        )?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk
    pub fn append(&mut self, record: &SearchRecord) -> Result<()> {
        let current = match record.current {
            Some(value) => format!("{:.6}", value),
            None => "skipped".to_string(),
        };
        writeln!(
            self.file,
            "{}\t{}\t{:.6}\t{}\t{}",
            record.iteration, record.elapsed_secs, record.best, current, record.params
        )?;
        self.file.flush()?;
        Ok(())
    }
}

/// Write the best-found value and assignment to the max-value file
pub fn write_max_file(path: &Path, best_value: f64, best_params: &str) -> Result<()> {
    fs::write(path, format!("Max time {:.6}\n{}\n", best_value, best_params))?;
    Ok(())
}
