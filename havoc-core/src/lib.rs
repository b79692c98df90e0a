//! HAVOC Core - Interference experiment primitives
//!
//! This crate provides the building blocks shared by the sweep and
//! tuning drivers:
//! - Trial samples and aggregated series statistics
//! - Core-to-enemy workload assignments
//! - Parameter spaces for configurable enemy templates
//! - The enemy build pipeline (template + parameters -> binary)
//! - The trial oracle (thermal gate + sequential trial execution)

pub mod enemy;
pub mod error;
pub mod oracle;
pub mod params;
pub mod series;
pub mod workload;

// Re-exports for convenient access
pub use enemy::{known_templates, Artifact, Compiler, EnemyTemplate};
pub use error::{HavocError, Result};
pub use oracle::{
    Oracle, ProcessExecutor, TemperatureSource, ThermalGate, ThermalZoneSource, TrialExecutor,
};
pub use params::{ParamAssignment, ParamKind, ParamSpec, ParamValue, ParameterSpace};
pub use series::{TrialSample, TrialSeries};
pub use workload::CoreAssignment;
