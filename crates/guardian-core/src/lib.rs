//! # Guardian Core
//!
//! Shared building blocks for the LLM-Guardian quality and health engine:
//!
//! - [`Error`] / [`Result`]: the error type every component returns
//! - [`types::Severity`]: severity scale shared by anomaly and drift output
//! - [`config::GuardianConfig`]: YAML + environment configuration
//! - [`record_log::RecordLog`]: append-only log with optional retention bound
//! - [`stats`]: mean / sample variance / rounding helpers

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod record_log;
pub mod stats;
pub mod types;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        AnomalyConfig, DriftConfig, ExperimentConfig, GuardianConfig, HealingConfig,
        HealthThresholds, RetentionConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::record_log::RecordLog;
    pub use crate::types::Severity;
}
