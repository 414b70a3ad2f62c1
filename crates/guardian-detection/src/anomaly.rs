//! Z-score anomaly detection over per-metric rolling windows.
//!
//! Every metric name gets its own [`MetricWindow`]. A new value is scored
//! against the window as it stood *before* the value arrived, then recorded:
//!
//! - fewer than `min_data_points` samples: record only (cold start)
//! - `|z| > z_high_threshold`: [`Severity::High`]
//! - `|z| > z_threshold`: [`Severity::Medium`]
//!
//! A constant history (std < 1e-10) scores any differing value as `+inf`.

use crate::window::MetricWindow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use llm_guardian_core::{config::AnomalyConfig, record_log::RecordLog, types::Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Std-dev below which a window is treated as constant
const DEGENERATE_STD: f64 = 1e-10;

/// Canned remediation hints, keyed by metric name
const RECOMMENDATIONS: &[(&str, &str)] = &[
    (
        "latency_p95_ms",
        "Check model provider latency and recent traffic spikes; consider scaling up or enabling caching",
    ),
    (
        "error_rate",
        "Inspect recent deployments and upstream provider status; review error logs for new failure modes",
    ),
    (
        "ragas_faithfulness",
        "Review retrieval quality and recent prompt or index changes; sample low-scoring responses",
    ),
    (
        "cost_per_query",
        "Check model routing and token usage per query; consider routing simple queries to a cheaper model",
    ),
    (
        "cache_hit_rate",
        "Verify cache health and TTL configuration; check for key-space changes after deploys",
    ),
    (
        "token_usage",
        "Inspect prompt templates and context window growth; check for runaway generations",
    ),
];

const FALLBACK_RECOMMENDATION: &str = "Investigate metric for unexpected changes";

/// Recommendation text for a metric
pub fn recommendation_for(metric_name: &str) -> &'static str {
    RECOMMENDATIONS
        .iter()
        .find(|(name, _)| *name == metric_name)
        .map(|(_, text)| *text)
        .unwrap_or(FALLBACK_RECOMMENDATION)
}

/// Map a z-score to a severity band
pub fn classify_severity(z_score: f64, threshold: f64, high_threshold: f64) -> Severity {
    let magnitude = z_score.abs();
    if magnitude > high_threshold {
        Severity::High
    } else if magnitude > threshold {
        Severity::Medium
    } else {
        Severity::None
    }
}

/// A detected anomaly. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub alert_id: Uuid,
    pub metric_name: String,
    pub current_value: f64,
    /// `+inf` when the history was constant
    pub z_score: f64,
    pub severity: Severity,
    /// Window mean before this value was recorded
    pub mean: f64,
    /// Window std-dev before this value was recorded
    pub std_dev: f64,
    pub timestamp: DateTime<Utc>,
    pub recommendation: String,
}

/// Summary of a metric's window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Detector counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Values recorded (including those passed to `detect`)
    pub observations: u64,
    /// Values actually scored (past cold start)
    pub detections: u64,
    pub alerts_raised: u64,
    /// NaN or infinite values dropped before reaching a window
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    observations: AtomicU64,
    detections: AtomicU64,
    alerts_raised: AtomicU64,
    rejected: AtomicU64,
}

/// Per-metric z-score anomaly detector
pub struct AnomalyDetector {
    config: AnomalyConfig,
    windows: DashMap<String, MetricWindow>,
    alerts: RwLock<RecordLog<AnomalyAlert>>,
    counters: Counters,
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("config", &self.config)
            .field("metrics", &self.windows.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

impl AnomalyDetector {
    /// Create a detector with an unbounded alert log
    pub fn new(config: AnomalyConfig) -> Self {
        Self::with_retention(config, None)
    }

    /// Create a detector keeping at most `max_alerts` alerts
    pub fn with_retention(config: AnomalyConfig, max_alerts: Option<usize>) -> Self {
        info!(
            window_size = config.window_size,
            z_threshold = config.z_threshold,
            z_high_threshold = config.z_high_threshold,
            min_data_points = config.min_data_points,
            "Creating anomaly detector"
        );

        Self {
            config,
            windows: DashMap::new(),
            alerts: RwLock::new(RecordLog::with_retention(max_alerts)),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Non-finite values would poison the window's mean and std until evicted
    fn reject_non_finite(&self, metric_name: &str, value: f64) -> bool {
        if value.is_finite() {
            return false;
        }
        warn!(metric = metric_name, value = value, "Dropping non-finite metric value");
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Append a value to the metric's window without scoring it.
    ///
    /// NaN and infinite values are dropped.
    pub fn record(&self, metric_name: &str, value: f64) {
        if self.reject_non_finite(metric_name, value) {
            return;
        }
        self.windows
            .entry(metric_name.to_string())
            .or_insert_with(|| MetricWindow::new(self.config.window_size))
            .push(value);
        self.counters.observations.fetch_add(1, Ordering::Relaxed);
    }

    /// Severity band for a z-score under this detector's thresholds
    pub fn severity(&self, z_score: f64) -> Severity {
        classify_severity(z_score, self.config.z_threshold, self.config.z_high_threshold)
    }

    /// Score `value` against the metric's history, then record it.
    ///
    /// Returns an alert when the value is anomalous. NaN and infinite values
    /// are dropped without touching the window.
    pub fn detect(&self, metric_name: &str, value: f64) -> Option<AnomalyAlert> {
        if self.reject_non_finite(metric_name, value) {
            return None;
        }
        let (z_score, mean, std_dev) = {
            let mut window = self
                .windows
                .entry(metric_name.to_string())
                .or_insert_with(|| MetricWindow::new(self.config.window_size));
            self.counters.observations.fetch_add(1, Ordering::Relaxed);

            if window.len() < self.config.min_data_points {
                debug!(
                    metric = metric_name,
                    samples = window.len(),
                    min_required = self.config.min_data_points,
                    "Insufficient samples for anomaly detection"
                );
                window.push(value);
                return None;
            }

            let mean = window.mean();
            let std_dev = window.std_dev();
            let z_score = if std_dev < DEGENERATE_STD {
                if (value - mean).abs() >= DEGENERATE_STD {
                    f64::INFINITY
                } else {
                    0.0
                }
            } else {
                (value - mean) / std_dev
            };

            window.push(value);
            (z_score, mean, std_dev)
        };
        self.counters.detections.fetch_add(1, Ordering::Relaxed);

        let severity = self.severity(z_score);
        if !severity.is_actionable() {
            return None;
        }

        let alert = AnomalyAlert {
            alert_id: Uuid::new_v4(),
            metric_name: metric_name.to_string(),
            current_value: value,
            z_score,
            severity,
            mean,
            std_dev,
            timestamp: Utc::now(),
            recommendation: recommendation_for(metric_name).to_string(),
        };

        warn!(
            metric = metric_name,
            value = value,
            z_score = z_score,
            mean = mean,
            std_dev = std_dev,
            severity = %severity,
            "Anomaly detected"
        );
        metrics::counter!(
            "guardian_anomaly_alerts_total",
            "metric" => metric_name.to_string(),
            "severity" => severity.as_str()
        )
        .increment(1);

        self.counters.alerts_raised.fetch_add(1, Ordering::Relaxed);
        self.alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());

        Some(alert)
    }

    /// Run [`detect`](Self::detect) for every entry; returns only the alerts
    pub fn detect_batch(&self, values: &HashMap<String, f64>) -> Vec<AnomalyAlert> {
        values
            .iter()
            .filter_map(|(name, value)| self.detect(name, *value))
            .collect()
    }

    /// Window summary; zeros for an unknown metric
    pub fn get_stats(&self, metric_name: &str) -> MetricStats {
        self.windows
            .get(metric_name)
            .map(|window| MetricStats {
                count: window.len(),
                mean: window.mean(),
                std_dev: window.std_dev(),
                min: window.min(),
                max: window.max(),
            })
            .unwrap_or_default()
    }

    /// Copy of the retained alert log, oldest first
    pub fn alerts(&self) -> Vec<AnomalyAlert> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Copy of the `n` most recent alerts
    pub fn recent_alerts(&self, n: usize) -> Vec<AnomalyAlert> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .recent(n)
    }

    /// Remove and return every retained alert
    pub fn drain_alerts(&self) -> Vec<AnomalyAlert> {
        self.alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
    }

    /// Names of every metric with a window, sorted
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            observations: self.counters.observations.load(Ordering::Relaxed),
            detections: self.counters.detections.load(Ordering::Relaxed),
            alerts_raised: self.counters.alerts_raised.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Drop every window and alert
    pub fn reset(&self) {
        self.windows.clear();
        self.alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Anomaly detector reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn detector(min_data_points: usize) -> AnomalyDetector {
        AnomalyDetector::new(AnomalyConfig {
            min_data_points,
            ..Default::default()
        })
    }

    #[test]
    fn test_cold_start_suppression() {
        let detector = detector(10);
        for _ in 0..9 {
            assert!(detector.detect("latency_p95_ms", 100.0).is_none());
        }
        // Still cold: 9 samples in the window before this call
        assert!(detector.detect("latency_p95_ms", 10_000.0).is_none());
        assert_eq!(detector.get_stats("latency_p95_ms").count, 10);
        assert_eq!(detector.stats().detections, 0);
    }

    #[test]
    fn test_constant_history_spike_is_high() {
        let detector = detector(5);
        for _ in 0..50 {
            detector.record("error_rate", 1.0);
        }

        let alert = detector.detect("error_rate", 100.0).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.metric_name, "error_rate");
        assert!(alert.z_score.is_infinite() && alert.z_score > 0.0);
        assert_eq!(alert.mean, 1.0);
        assert_eq!(detector.alerts().len(), 1);
    }

    #[test]
    fn test_constant_history_same_value_is_normal() {
        let detector = detector(5);
        for _ in 0..20 {
            detector.record("cache_hit_rate", 0.5);
        }
        assert!(detector.detect("cache_hit_rate", 0.5).is_none());
    }

    #[test]
    fn test_score_excludes_current_value() {
        let detector = detector(3);
        for v in [10.0, 12.0, 14.0] {
            detector.record("m", v);
        }
        // mean 12, std 2 => z = 4.5
        let alert = detector.detect("m", 21.0).unwrap();
        assert!((alert.z_score - 4.5).abs() < 1e-12);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.mean, 12.0);
        assert_eq!(alert.std_dev, 2.0);
        // and the value is recorded afterwards
        assert_eq!(detector.get_stats("m").count, 4);
    }

    #[test]
    fn test_medium_band() {
        let detector = detector(3);
        for v in [10.0, 12.0, 14.0] {
            detector.record("m", v);
        }
        // z = 3.5
        let alert = detector.detect("m", 19.0).unwrap();
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.recommendation, FALLBACK_RECOMMENDATION);
    }

    #[test]
    fn test_negative_deviation() {
        let detector = detector(3);
        for v in [10.0, 12.0, 14.0] {
            detector.record("m", v);
        }
        let alert = detector.detect("m", 0.0).unwrap();
        assert!(alert.z_score < 0.0);
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn test_detect_batch_returns_only_alerts() {
        let detector = detector(5);
        for _ in 0..10 {
            detector.record("error_rate", 0.01);
            detector.record("latency_p95_ms", 200.0);
        }

        let mut batch = HashMap::new();
        batch.insert("error_rate".to_string(), 0.5);
        batch.insert("latency_p95_ms".to_string(), 200.0);

        let alerts = detector.detect_batch(&batch);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric_name, "error_rate");
        assert_eq!(alerts[0].recommendation, recommendation_for("error_rate"));
    }

    #[test]
    fn test_unknown_metric_stats_are_zero() {
        let detector = AnomalyDetector::default();
        assert_eq!(detector.get_stats("nope"), MetricStats::default());
    }

    #[test]
    fn test_alert_retention_and_drain() {
        let config = AnomalyConfig {
            min_data_points: 2,
            ..Default::default()
        };
        let detector = AnomalyDetector::with_retention(config, Some(2));
        for (name, spike) in [("a", 50.0), ("b", 60.0), ("c", 70.0)] {
            detector.record(name, 1.0);
            detector.record(name, 1.0);
            assert!(detector.detect(name, spike).is_some());
        }
        assert_eq!(detector.alerts().len(), 2);
        assert_eq!(detector.recent_alerts(1)[0].current_value, 70.0);

        let drained = detector.drain_alerts();
        assert_eq!(drained.len(), 2);
        assert!(detector.alerts().is_empty());
        assert_eq!(detector.stats().alerts_raised, 3);
    }

    #[test]
    fn test_threshold_boundaries_are_exclusive() {
        assert_eq!(classify_severity(3.0, 3.0, 4.0), Severity::None);
        assert_eq!(classify_severity(-3.0, 3.0, 4.0), Severity::None);
        assert_eq!(classify_severity(4.0, 3.0, 4.0), Severity::Medium);
        assert_eq!(classify_severity(f64::INFINITY, 3.0, 4.0), Severity::High);
    }

    #[test]
    fn test_non_finite_values_never_reach_the_window() {
        let detector = detector(10);
        detector.record("latency_p95_ms", f64::NAN);
        for _ in 0..50 {
            detector.record("latency_p95_ms", 200.0);
        }
        assert!(detector.detect("latency_p95_ms", f64::INFINITY).is_none());
        assert!(detector.detect("latency_p95_ms", f64::NAN).is_none());

        let stats = detector.get_stats("latency_p95_ms");
        assert_eq!(stats.count, 50);
        assert_eq!(stats.mean, 200.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(detector.stats().rejected, 3);

        let alert = detector.detect("latency_p95_ms", 1e9).unwrap();
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn test_reset_clears_state() {
        let detector = detector(2);
        detector.record("a", 1.0);
        detector.record("b", 2.0);
        assert_eq!(detector.metric_names(), vec!["a".to_string(), "b".to_string()]);

        detector.reset();
        assert!(detector.metric_names().is_empty());
    }

    proptest! {
        #[test]
        fn prop_severity_is_monotonic(z in -100.0f64..100.0) {
            let sev = classify_severity(z, 3.0, 4.0);
            let expected = if z.abs() > 4.0 {
                Severity::High
            } else if z.abs() > 3.0 {
                Severity::Medium
            } else {
                Severity::None
            };
            prop_assert_eq!(sev, expected);
        }

        #[test]
        fn prop_larger_magnitude_never_lowers_severity(a in 0.0f64..10.0, b in 0.0f64..10.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify_severity(hi, 3.0, 4.0) >= classify_severity(lo, 3.0, 4.0));
        }
    }
}
