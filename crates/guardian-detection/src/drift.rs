//! Distribution drift between a production sample and a reference sample.
//!
//! # Detection Method
//! Each sample is binned into `n_bins` equal-width bins over *its own*
//! min/max range, normalised and smoothed so that every bin is strictly
//! positive. Two scores are computed from the resulting distributions:
//!
//! - KL divergence `KL(reference || production) = Σ p ln(p / q)`
//! - Population Stability Index `PSI = Σ (a - e) ln(a / e)` with the
//!   reference as expected `e` and production as actual `a`
//!
//! Severity bands:
//! - HIGH: KL > kl_threshold and PSI > 0.25
//! - MEDIUM: KL > kl_threshold or PSI > 0.20
//! - LOW: PSI > 0.10
//!
//! KL is deliberately one-directional; the severity bands were tuned against
//! `KL(reference || production)`.

use chrono::{DateTime, Utc};
use llm_guardian_core::{
    config::DriftConfig, record_log::RecordLog, stats, types::Severity, Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

/// PSI above which drift is HIGH (together with KL over threshold)
pub const PSI_HIGH_BAND: f64 = 0.25;

/// PSI above which drift is at least MEDIUM
pub const PSI_MEDIUM_BAND: f64 = 0.20;

/// PSI above which drift is at least LOW
pub const PSI_LOW_BAND: f64 = 0.10;

/// Minimum sample size accepted by [`DriftMonitor::detect_drift`]
pub const MIN_SAMPLE_SIZE: usize = 2;

/// Convert a sample into a smoothed discrete distribution.
///
/// Bins span the sample's own `[min, max]`; a constant sample puts all of its
/// mass in the first bin. `smoothing` is added to every raw bin count before
/// normalising, giving `(count + smoothing) / (n + n_bins * smoothing)`, so the
/// result is strictly positive and sums to 1.
pub fn to_distribution(values: &[f64], n_bins: usize, smoothing: f64) -> Vec<f64> {
    let n_bins = n_bins.max(1);
    let mut counts = vec![0usize; n_bins];

    if !values.is_empty() {
        let min_val = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max_val = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max_val - min_val;

        for &val in values {
            let bin = if range > 0.0 {
                (((val - min_val) / range) * n_bins as f64).floor() as usize
            } else {
                0
            };
            counts[bin.min(n_bins - 1)] += 1;
        }
    }

    let smoothed: Vec<f64> = counts.iter().map(|&c| c as f64 + smoothing).collect();
    let norm: f64 = smoothed.iter().sum();
    smoothed.into_iter().map(|c| c / norm).collect()
}

/// KL divergence `Σ p ln(p / q)` over bins where `p > 0`.
///
/// Fails with [`Error::LengthMismatch`] if the vectors differ in length.
pub fn calculate_kl_divergence(p: &[f64], q: &[f64]) -> Result<f64> {
    if p.len() != q.len() {
        return Err(Error::length_mismatch(p.len(), q.len()));
    }
    Ok(p.iter()
        .zip(q)
        .filter(|(pi, _)| **pi > 0.0)
        .map(|(pi, qi)| pi * (pi / qi).ln())
        .sum())
}

/// Population Stability Index `Σ (a - e) ln(a / e)`.
///
/// Fails with [`Error::LengthMismatch`] if the vectors differ in length.
pub fn calculate_psi(expected: &[f64], actual: &[f64]) -> Result<f64> {
    if expected.len() != actual.len() {
        return Err(Error::length_mismatch(expected.len(), actual.len()));
    }
    Ok(expected
        .iter()
        .zip(actual)
        .map(|(e, a)| (a - e) * (a / e).ln())
        .sum())
}

/// Severity of a (KL, PSI) pair
pub fn classify_drift(kl: f64, psi: f64, kl_threshold: f64) -> Severity {
    let kl_breach = kl > kl_threshold;
    if kl_breach && psi > PSI_HIGH_BAND {
        Severity::High
    } else if kl_breach || psi > PSI_MEDIUM_BAND {
        Severity::Medium
    } else if psi > PSI_LOW_BAND {
        Severity::Low
    } else {
        Severity::None
    }
}

/// Fixed recommendation per severity
pub fn drift_recommendation(severity: Severity) -> &'static str {
    match severity {
        Severity::High => {
            "Significant drift detected: consider retraining or re-indexing and review recent data pipeline changes"
        }
        Severity::Medium => {
            "Moderate drift detected: monitor closely and compare input distributions across time periods"
        }
        Severity::Low => "Minor drift detected: continue monitoring",
        Severity::None => "No significant drift detected",
    }
}

/// Inputs and thresholds behind a drift report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftDetails {
    pub production_size: usize,
    pub reference_size: usize,
    pub production_mean: f64,
    pub reference_mean: f64,
    pub n_bins: usize,
    pub kl_threshold: f64,
    pub psi_threshold: f64,
}

/// Result of one drift comparison. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub kl_divergence: f64,
    pub psi: f64,
    pub drift_detected: bool,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub recommendation: String,
    pub details: DriftDetails,
}

/// Drift monitor with an append-only report history
pub struct DriftMonitor {
    config: DriftConfig,
    history: RwLock<RecordLog<DriftReport>>,
}

impl std::fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftMonitor")
            .field("config", &self.config)
            .field("reports", &self.history_len())
            .finish()
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new(DriftConfig::default())
    }
}

impl DriftMonitor {
    /// Create a monitor with unbounded history
    pub fn new(config: DriftConfig) -> Self {
        Self::with_retention(config, None)
    }

    /// Create a monitor keeping at most `max_reports` reports
    pub fn with_retention(config: DriftConfig, max_reports: Option<usize>) -> Self {
        info!(
            kl_threshold = config.kl_threshold,
            psi_threshold = config.psi_threshold,
            n_bins = config.n_bins,
            "Creating drift monitor"
        );

        Self {
            config,
            history: RwLock::new(RecordLog::with_retention(max_reports)),
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Compare a production sample against a reference sample.
    ///
    /// Fails with [`Error::InvalidArgument`] if either sample has fewer than
    /// two values or contains a non-finite value.
    pub fn detect_drift(&self, production: &[f64], reference: &[f64]) -> Result<DriftReport> {
        validate_sample("production", production)?;
        validate_sample("reference", reference)?;

        let n_bins = self.config.n_bins;
        let prod_dist = to_distribution(production, n_bins, self.config.smoothing);
        let ref_dist = to_distribution(reference, n_bins, self.config.smoothing);

        let kl_divergence = calculate_kl_divergence(&ref_dist, &prod_dist)?;
        let psi = calculate_psi(&ref_dist, &prod_dist)?;

        let severity = classify_drift(kl_divergence, psi, self.config.kl_threshold);
        let drift_detected =
            kl_divergence > self.config.kl_threshold || psi > self.config.psi_threshold;

        let report = DriftReport {
            kl_divergence,
            psi,
            drift_detected,
            severity,
            timestamp: Utc::now(),
            recommendation: drift_recommendation(severity).to_string(),
            details: DriftDetails {
                production_size: production.len(),
                reference_size: reference.len(),
                production_mean: stats::mean(production),
                reference_mean: stats::mean(reference),
                n_bins,
                kl_threshold: self.config.kl_threshold,
                psi_threshold: self.config.psi_threshold,
            },
        };

        if drift_detected {
            warn!(
                kl = kl_divergence,
                psi = psi,
                severity = %severity,
                production_samples = production.len(),
                reference_samples = reference.len(),
                "Drift detected"
            );
        } else {
            debug!(kl = kl_divergence, psi = psi, "No drift detected");
        }
        metrics::counter!(
            "guardian_drift_reports_total",
            "severity" => severity.as_str()
        )
        .increment(1);

        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());

        Ok(report)
    }

    /// Copy of the retained report history, oldest first
    pub fn history(&self) -> Vec<DriftReport> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Most recent report
    pub fn latest(&self) -> Option<DriftReport> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Remove and return every retained report
    pub fn drain_history(&self) -> Vec<DriftReport> {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
    }

    fn history_len(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn validate_sample(label: &str, values: &[f64]) -> Result<()> {
    if values.len() < MIN_SAMPLE_SIZE {
        return Err(Error::invalid_argument(format!(
            "{} sample needs at least {} values, got {}",
            label,
            MIN_SAMPLE_SIZE,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_argument(format!(
            "{} sample contains non-finite values",
            label
        )));
    }
    Ok(())
}
