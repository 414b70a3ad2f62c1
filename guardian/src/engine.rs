//! The `Guardian` facade and its replayable event stream.
//!
//! Owns one instance of each component and routes tagged events to them.
//! Components are independent; the facade only fans events out.

use anyhow::{Context, Result};
use llm_guardian_core::config::GuardianConfig;
use llm_guardian_detection::prelude::*;
use llm_guardian_experiments::prelude::*;
use llm_guardian_healing::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Input event, one per JSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Scalar metric sample. Scored unless `record_only` is set.
    Observation {
        metric: String,
        value: f64,
        #[serde(default)]
        record_only: bool,
    },
    DriftBatch {
        production: Vec<f64>,
        reference: Vec<f64>,
    },
    ExperimentCreate(ExperimentSpec),
    ExperimentStart {
        experiment_id: String,
    },
    ExperimentAssign {
        experiment_id: String,
        user_id: String,
    },
    ExperimentMetric {
        experiment_id: String,
        variant: String,
        value: f64,
    },
    ExperimentAnalyze {
        experiment_id: String,
    },
    HealthSignal(HealthSignal),
}

/// Something an event produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    Alert(AnomalyAlert),
    Drift(DriftReport),
    Assignment {
        experiment_id: String,
        user_id: String,
        variant: Variant,
    },
    ExperimentResult(ExperimentResult),
    Remediation(RemediationRecord),
}

/// Point-in-time view across all components
#[derive(Debug, Clone, Serialize)]
pub struct GuardianStatus {
    pub detector: DetectorStats,
    pub tracked_metrics: Vec<String>,
    pub alerts_retained: usize,
    pub drift_reports_retained: usize,
    pub experiments: ManagerStats,
    pub healing: HealingStatus,
}

/// All four components behind one handle
#[derive(Debug)]
pub struct Guardian {
    detector: AnomalyDetector,
    drift: DriftMonitor,
    experiments: ExperimentManager,
    healing: SelfHealingSystem,
}

impl Guardian {
    pub fn new(config: GuardianConfig) -> Self {
        let retention = config.retention;
        let detector = AnomalyDetector::with_retention(config.anomaly, retention.max_alerts);
        let drift = DriftMonitor::with_retention(config.drift, retention.max_drift_reports);
        let experiments = ExperimentManager::new(config.experiments);
        let healing = SelfHealingSystem::with_retention(config.healing, retention.max_remediations);

        info!("Guardian engine initialized");
        Self {
            detector,
            drift,
            experiments,
            healing,
        }
    }

    /// Route one event. Returns what it produced, if anything.
    pub fn handle(&self, event: Event) -> Result<Option<Output>> {
        let output = match event {
            Event::Observation {
                metric,
                value,
                record_only,
            } => {
                if record_only {
                    self.detector.record(&metric, value);
                    None
                } else {
                    self.detector.detect(&metric, value).map(Output::Alert)
                }
            }
            Event::DriftBatch {
                production,
                reference,
            } => {
                let report = self
                    .drift
                    .detect_drift(&production, &reference)
                    .context("drift batch rejected")?;
                Some(Output::Drift(report))
            }
            Event::ExperimentCreate(spec) => {
                self.experiments
                    .create_experiment(spec)
                    .context("failed to create experiment")?;
                None
            }
            Event::ExperimentStart { experiment_id } => {
                self.experiments
                    .start_experiment(&experiment_id)
                    .with_context(|| format!("failed to start experiment '{}'", experiment_id))?;
                None
            }
            Event::ExperimentAssign {
                experiment_id,
                user_id,
            } => {
                let variant = self.experiments.assign_variant(&experiment_id, &user_id);
                Some(Output::Assignment {
                    experiment_id,
                    user_id,
                    variant,
                })
            }
            Event::ExperimentMetric {
                experiment_id,
                variant,
                value,
            } => {
                self.experiments
                    .record_metric(&experiment_id, &variant, value);
                None
            }
            Event::ExperimentAnalyze { experiment_id } => {
                let result = self
                    .experiments
                    .analyze(&experiment_id)
                    .with_context(|| format!("failed to analyze experiment '{}'", experiment_id))?;
                Some(Output::ExperimentResult(result))
            }
            Event::HealthSignal(signal) => {
                let record = self.healing.monitor_and_heal(&signal);
                // healthy ticks carry no information for the output stream
                record.issue.map(|_| Output::Remediation(record))
            }
        };
        Ok(output)
    }

    /// Parse and route one JSON line. Blank lines produce nothing.
    pub fn handle_line(&self, line: &str) -> Result<Option<Output>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let event: Event = serde_json::from_str(line).context("invalid event JSON")?;
        debug!(?event, "Handling event");
        self.handle(event)
    }

    pub fn status(&self) -> GuardianStatus {
        GuardianStatus {
            detector: self.detector.stats(),
            tracked_metrics: self.detector.metric_names(),
            alerts_retained: self.detector.alerts().len(),
            drift_reports_retained: self.drift.history().len(),
            experiments: self.experiments.stats(),
            healing: self.healing.get_status(),
        }
    }
}

impl Default for Guardian {
    fn default() -> Self {
        Self::new(GuardianConfig::default())
    }
}
