//! Engine configuration.
//!
//! Loaded from YAML (`GuardianConfig::from_file`), then overridden by
//! `GUARDIAN_*` environment variables. Every field has a default so an empty
//! file is a valid configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Default anomaly window capacity
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Default samples required before anomaly detection starts
pub const DEFAULT_MIN_DATA_POINTS: usize = 10;

/// Default histogram bin count for drift detection
pub const DEFAULT_DRIFT_BINS: usize = 50;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    pub anomaly: AnomalyConfig,
    pub drift: DriftConfig,
    pub experiments: ExperimentConfig,
    pub healing: HealingConfig,
    pub retention: RetentionConfig,
}

/// Z-score anomaly detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Capacity of each per-metric window
    pub window_size: usize,
    /// |z| above this is a medium-severity anomaly
    pub z_threshold: f64,
    /// |z| above this is a high-severity anomaly
    pub z_high_threshold: f64,
    /// Samples required before a metric is evaluated
    pub min_data_points: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            z_threshold: 3.0,
            z_high_threshold: 4.0,
            min_data_points: DEFAULT_MIN_DATA_POINTS,
        }
    }
}

/// Distribution drift settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// KL divergence above this counts as drift
    pub kl_threshold: f64,
    /// PSI above this counts as drift (independent of the severity bands)
    pub psi_threshold: f64,
    /// Histogram bins per sample
    pub n_bins: usize,
    /// Additive smoothing applied to every bin
    pub smoothing: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            kl_threshold: 0.1,
            psi_threshold: 0.2,
            n_bins: DEFAULT_DRIFT_BINS,
            smoothing: 1e-10,
        }
    }
}

/// Defaults applied to newly created experiments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub default_significance_level: f64,
    pub default_min_sample_size: usize,
    pub default_duration_days: u32,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            default_significance_level: 0.05,
            default_min_sample_size: 100,
            default_duration_days: 7,
        }
    }
}

/// Issue thresholds for health signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Error rate above this is an issue
    pub max_error_rate: f64,
    /// p95 latency (ms) above this is an issue
    pub max_latency_p95_ms: f64,
    /// Faithfulness below this is an issue
    pub min_faithfulness: f64,
    /// Cost per query above this is an issue
    pub max_cost_per_query: f64,
    /// Cache hit rate below this is an issue
    pub min_cache_hit_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.05,
            max_latency_p95_ms: 500.0,
            min_faithfulness: 0.85,
            max_cost_per_query: 0.10,
            min_cache_hit_rate: 0.30,
        }
    }
}

/// Self-healing knob limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub thresholds: HealthThresholds,
    /// Multiplier applied by the cache TTL increase action
    pub cache_ttl_step: f64,
    /// Cap for the cache TTL increase action
    pub cache_ttl_cap: f64,
    /// Multiplier applied by the aggressive cache action
    pub aggressive_cache_step: f64,
    /// Cap for the aggressive cache action
    pub aggressive_cache_cap: f64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            cache_ttl_step: 1.5,
            cache_ttl_cap: 5.0,
            aggressive_cache_step: 2.0,
            aggressive_cache_cap: 10.0,
        }
    }
}

/// Retention bounds for the append-only logs (`None` = unbounded)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_alerts: Option<usize>,
    pub max_drift_reports: Option<usize>,
    pub max_remediations: Option<usize>,
}

impl GuardianConfig {
    /// Load configuration from a YAML file, apply environment overrides and
    /// validate the result
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&raw)?;
        config.apply_env();
        config.validate()?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a YAML string (no env overrides)
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `GUARDIAN_*` environment variables
    pub fn apply_env(&mut self) {
        override_from_env("GUARDIAN_WINDOW_SIZE", &mut self.anomaly.window_size);
        override_from_env("GUARDIAN_Z_THRESHOLD", &mut self.anomaly.z_threshold);
        override_from_env("GUARDIAN_Z_HIGH_THRESHOLD", &mut self.anomaly.z_high_threshold);
        override_from_env("GUARDIAN_MIN_DATA_POINTS", &mut self.anomaly.min_data_points);
        override_from_env("GUARDIAN_KL_THRESHOLD", &mut self.drift.kl_threshold);
        override_from_env("GUARDIAN_PSI_THRESHOLD", &mut self.drift.psi_threshold);
        override_from_env("GUARDIAN_DRIFT_BINS", &mut self.drift.n_bins);
        override_from_env(
            "GUARDIAN_SIGNIFICANCE_LEVEL",
            &mut self.experiments.default_significance_level,
        );
        override_from_env(
            "GUARDIAN_MIN_SAMPLE_SIZE",
            &mut self.experiments.default_min_sample_size,
        );

        if let Some(max) = env_parse::<usize>("GUARDIAN_MAX_ALERTS") {
            self.retention.max_alerts = Some(max);
        }
        if let Some(max) = env_parse::<usize>("GUARDIAN_MAX_DRIFT_REPORTS") {
            self.retention.max_drift_reports = Some(max);
        }
        if let Some(max) = env_parse::<usize>("GUARDIAN_MAX_REMEDIATIONS") {
            self.retention.max_remediations = Some(max);
        }
    }

    /// Reject configurations no component can run with
    pub fn validate(&self) -> Result<()> {
        let a = &self.anomaly;
        if a.window_size == 0 {
            return Err(Error::config("anomaly.window_size must be > 0"));
        }
        if a.z_threshold <= 0.0 || a.z_high_threshold < a.z_threshold {
            return Err(Error::config(format!(
                "anomaly thresholds must satisfy 0 < z_threshold <= z_high_threshold (got {} / {})",
                a.z_threshold, a.z_high_threshold
            )));
        }

        let d = &self.drift;
        if d.n_bins == 0 {
            return Err(Error::config("drift.n_bins must be > 0"));
        }
        if d.smoothing <= 0.0 {
            return Err(Error::config("drift.smoothing must be > 0"));
        }
        if d.kl_threshold < 0.0 || d.psi_threshold < 0.0 {
            return Err(Error::config("drift thresholds must be non-negative"));
        }

        let alpha = self.experiments.default_significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::config(format!(
                "experiments.default_significance_level must be in (0, 1), got {}",
                alpha
            )));
        }

        let h = &self.healing;
        if h.cache_ttl_step < 1.0 || h.aggressive_cache_step < 1.0 {
            return Err(Error::config("healing cache steps must be >= 1.0"));
        }
        if h.cache_ttl_cap < 1.0 || h.aggressive_cache_cap < 1.0 {
            return Err(Error::config("healing cache caps must be >= 1.0"));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn override_from_env<T: FromStr + std::fmt::Debug>(var: &str, target: &mut T) {
    if let Some(value) = env_parse::<T>(var) {
        debug!(var, value = ?value, "Configuration override from environment");
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = GuardianConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.anomaly.window_size, 1000);
        assert_eq!(config.anomaly.min_data_points, 10);
        assert_eq!(config.drift.n_bins, 50);
        assert!(config.retention.max_alerts.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = GuardianConfig::from_yaml(
            "anomaly:\n  z_threshold: 2.5\ndrift:\n  n_bins: 20\n",
        )
        .unwrap();
        assert_eq!(config.anomaly.z_threshold, 2.5);
        assert_eq!(config.anomaly.z_high_threshold, 4.0);
        assert_eq!(config.drift.n_bins, 20);
        assert_eq!(config.healing.thresholds.max_error_rate, 0.05);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = GuardianConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.drift.kl_threshold, 0.1);
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = GuardianConfig::default();
        config.anomaly.z_high_threshold = 2.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = GuardianConfig::default();
        config.drift.n_bins = 0;
        assert!(config.validate().is_err());

        let mut config = GuardianConfig::default();
        config.experiments.default_significance_level = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retention:\n  max_alerts: 500").unwrap();

        let config = GuardianConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retention.max_alerts, Some(500));
    }

    #[test]
    fn test_from_file_missing() {
        let result = GuardianConfig::from_file("/nonexistent/guardian.yaml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
