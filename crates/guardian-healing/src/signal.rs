//! Health signals and issue classification.

use llm_guardian_core::config::HealthThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregated health snapshot. Every field defaults to a healthy value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSignal {
    pub latency_p95_ms: f64,
    pub error_rate: f64,
    pub avg_ragas_faithfulness: f64,
    pub avg_cost_per_query: f64,
    pub cache_hit_rate: f64,
}

impl Default for HealthSignal {
    fn default() -> Self {
        Self {
            latency_p95_ms: 200.0,
            error_rate: 0.01,
            avg_ragas_faithfulness: 0.95,
            avg_cost_per_query: 0.02,
            cache_hit_rate: 0.6,
        }
    }
}

/// Health issue, listed in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthIssue {
    HighErrorRate,
    HighLatency,
    LowQuality,
    HighCost,
    LowCacheHitRate,
}

impl HealthIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighErrorRate => "high_error_rate",
            Self::HighLatency => "high_latency",
            Self::LowQuality => "low_quality",
            Self::HighCost => "high_cost",
            Self::LowCacheHitRate => "low_cache_hit_rate",
        }
    }
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HealthSignal {
    /// Highest-priority issue under the default thresholds
    pub fn detect_issue(&self) -> Option<HealthIssue> {
        self.detect_issue_with(&HealthThresholds::default())
    }

    /// Highest-priority issue under `thresholds`.
    ///
    /// Only one issue is reported even when several thresholds are breached.
    pub fn detect_issue_with(&self, thresholds: &HealthThresholds) -> Option<HealthIssue> {
        if self.error_rate > thresholds.max_error_rate {
            Some(HealthIssue::HighErrorRate)
        } else if self.latency_p95_ms > thresholds.max_latency_p95_ms {
            Some(HealthIssue::HighLatency)
        } else if self.avg_ragas_faithfulness < thresholds.min_faithfulness {
            Some(HealthIssue::LowQuality)
        } else if self.avg_cost_per_query > thresholds.max_cost_per_query {
            Some(HealthIssue::HighCost)
        } else if self.cache_hit_rate < thresholds.min_cache_hit_rate {
            Some(HealthIssue::LowCacheHitRate)
        } else {
            None
        }
    }

    /// Human-readable description of the breach behind `issue`
    pub fn describe(&self, issue: HealthIssue, thresholds: &HealthThresholds) -> String {
        match issue {
            HealthIssue::HighErrorRate => format!(
                "error_rate {:.4} > {:.4}",
                self.error_rate, thresholds.max_error_rate
            ),
            HealthIssue::HighLatency => format!(
                "latency_p95_ms {:.1} > {:.1}",
                self.latency_p95_ms, thresholds.max_latency_p95_ms
            ),
            HealthIssue::LowQuality => format!(
                "avg_ragas_faithfulness {:.4} < {:.4}",
                self.avg_ragas_faithfulness, thresholds.min_faithfulness
            ),
            HealthIssue::HighCost => format!(
                "avg_cost_per_query {:.4} > {:.4}",
                self.avg_cost_per_query, thresholds.max_cost_per_query
            ),
            HealthIssue::LowCacheHitRate => format!(
                "cache_hit_rate {:.4} < {:.4}",
                self.cache_hit_rate, thresholds.min_cache_hit_rate
            ),
        }
    }
}
