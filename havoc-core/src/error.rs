//! Error taxonomy shared across the workspace

use std::path::PathBuf;

/// Errors produced by the orchestration layer.
///
/// Most of these are configuration-scoped: the drivers report them and
/// continue with the next configuration or manifest entry rather than
/// aborting the whole run.
#[derive(Debug, thiserror::Error)]
pub enum HavocError {
    /// Malformed or missing configuration field
    #[error("config error: {0}")]
    Config(String),

    /// The toolchain failed to build an enemy artifact
    #[error("failed to build {template}: {stderr}")]
    Build { template: PathBuf, stderr: String },

    /// Temperature never cleared the ceiling within the wait bound
    #[error("temperature stayed above {ceiling}\u{b0}C for {waited_secs}s")]
    ThermalTimeout { ceiling: f64, waited_secs: u64 },

    /// A partial result file could not be read during the final merge
    #[error("unreadable partial result {path}: {reason}")]
    Merge { path: PathBuf, reason: String },

    /// The external trial executor failed
    #[error("trial executor: {0}")]
    Executor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HavocError>;
