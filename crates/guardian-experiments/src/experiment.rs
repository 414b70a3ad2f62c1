//! Experiment data model.

use crate::guardrails::Guardrail;
use chrono::{DateTime, Utc};
use llm_guardian_core::{config::ExperimentConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Experiment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    /// Terminal
    Concluded,
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Running => write!(f, "running"),
            Self::Concluded => write!(f, "concluded"),
        }
    }
}

/// Which direction of the primary metric counts as an improvement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessDirection {
    #[default]
    Higher,
    Lower,
}

impl SuccessDirection {
    /// Whether a treatment-minus-control difference points the right way
    pub fn is_improvement(&self, diff: f64) -> bool {
        match self {
            Self::Higher => diff > 0.0,
            Self::Lower => diff < 0.0,
        }
    }
}

/// Variant a user is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Control,
    Treatment,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    DeployTreatment,
    KeepControl,
    ExtendExperiment,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeployTreatment => "deploy_treatment",
            Self::KeepControl => "keep_control",
            Self::ExtendExperiment => "extend_experiment",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One arm of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentVariant {
    pub name: String,
    /// Share of traffic in `[0, 1]`
    pub allocation: f64,
    /// Opaque variant configuration handed to the serving layer
    pub config: serde_json::Value,
    /// Recorded outcome samples for the primary metric
    pub metrics: Vec<f64>,
}

impl ExperimentVariant {
    pub fn new(name: impl Into<String>, allocation: f64, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            allocation,
            config,
            metrics: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.metrics.len()
    }
}

/// Statistical outcome of [`ExperimentManager::analyze`](crate::ExperimentManager::analyze)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub experiment_id: String,
    pub control_mean: f64,
    pub treatment_mean: f64,
    pub control_n: usize,
    pub treatment_n: usize,
    /// Welch's t, 4 decimals
    pub t_statistic: f64,
    /// Two-sided normal-approximation p-value, 6 decimals
    pub p_value: f64,
    /// 4 decimals
    pub cohens_d: f64,
    /// Relative lift over control in percent, 2 decimals
    pub improvement_pct: f64,
    pub is_significant: bool,
    pub guardrails_passed: bool,
    pub decision: Decision,
    pub analyzed_at: DateTime<Utc>,
}

/// A controlled experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub hypothesis: String,
    pub status: ExperimentStatus,
    pub primary_metric: String,
    pub success_direction: SuccessDirection,
    pub duration_days: u32,
    /// Combined sample count below which an inconclusive test is extended
    pub min_sample_size: usize,
    pub significance_level: f64,
    pub guardrails: Vec<Guardrail>,
    pub control: ExperimentVariant,
    pub treatment: ExperimentVariant,
    pub result: Option<ExperimentResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub concluded_at: Option<DateTime<Utc>>,
}

impl Experiment {
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    /// Variant matching `name`: "control", "treatment" or a variant's own name
    pub fn variant_mut(&mut self, name: &str) -> Option<&mut ExperimentVariant> {
        if name.eq_ignore_ascii_case(Variant::Control.as_str()) || name == self.control.name {
            Some(&mut self.control)
        } else if name.eq_ignore_ascii_case(Variant::Treatment.as_str())
            || name == self.treatment.name
        {
            Some(&mut self.treatment)
        } else {
            None
        }
    }

    pub fn total_samples(&self) -> usize {
        self.control.sample_count() + self.treatment.sample_count()
    }
}

/// Parameters for a new experiment.
///
/// ```
/// use llm_guardian_experiments::{ExperimentSpec, SuccessDirection};
///
/// let spec = ExperimentSpec::new("exp-1", "Reranker v2", "faithfulness")
///     .hypothesis("The new reranker raises faithfulness")
///     .treatment_allocation(0.2)
///     .success_direction(SuccessDirection::Higher);
/// assert_eq!(spec.treatment_allocation, 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub hypothesis: String,
    pub primary_metric: String,
    #[serde(default)]
    pub success_direction: SuccessDirection,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub min_sample_size: Option<usize>,
    #[serde(default)]
    pub significance_level: Option<f64>,
    #[serde(default)]
    pub guardrails: Vec<Guardrail>,
    #[serde(default = "default_allocation")]
    pub treatment_allocation: f64,
    #[serde(default)]
    pub control_config: serde_json::Value,
    #[serde(default)]
    pub treatment_config: serde_json::Value,
}

fn default_allocation() -> f64 {
    0.5
}

impl ExperimentSpec {
    pub fn new(
        experiment_id: impl Into<String>,
        name: impl Into<String>,
        primary_metric: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            hypothesis: String::new(),
            primary_metric: primary_metric.into(),
            success_direction: SuccessDirection::default(),
            duration_days: None,
            min_sample_size: None,
            significance_level: None,
            guardrails: Vec::new(),
            treatment_allocation: default_allocation(),
            control_config: serde_json::Value::Null,
            treatment_config: serde_json::Value::Null,
        }
    }

    pub fn hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = hypothesis.into();
        self
    }

    pub fn success_direction(mut self, direction: SuccessDirection) -> Self {
        self.success_direction = direction;
        self
    }

    pub fn duration_days(mut self, days: u32) -> Self {
        self.duration_days = Some(days);
        self
    }

    pub fn min_sample_size(mut self, n: usize) -> Self {
        self.min_sample_size = Some(n);
        self
    }

    pub fn significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = Some(alpha);
        self
    }

    pub fn guardrail(mut self, guardrail: Guardrail) -> Self {
        self.guardrails.push(guardrail);
        self
    }

    pub fn treatment_allocation(mut self, allocation: f64) -> Self {
        self.treatment_allocation = allocation;
        self
    }

    pub fn control_config(mut self, config: serde_json::Value) -> Self {
        self.control_config = config;
        self
    }

    pub fn treatment_config(mut self, config: serde_json::Value) -> Self {
        self.treatment_config = config;
        self
    }

    /// Build a draft experiment, filling unset fields from `defaults`
    pub fn build(self, defaults: &ExperimentConfig) -> Result<Experiment> {
        if self.experiment_id.is_empty() {
            return Err(Error::invalid_argument("experiment_id must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.treatment_allocation) {
            return Err(Error::invalid_argument(format!(
                "treatment allocation must be in [0, 1], got {}",
                self.treatment_allocation
            )));
        }
        let significance_level = self
            .significance_level
            .unwrap_or(defaults.default_significance_level);
        if !(significance_level > 0.0 && significance_level < 1.0) {
            return Err(Error::invalid_argument(format!(
                "significance level must be in (0, 1), got {}",
                significance_level
            )));
        }

        Ok(Experiment {
            experiment_id: self.experiment_id,
            name: self.name,
            hypothesis: self.hypothesis,
            status: ExperimentStatus::Draft,
            primary_metric: self.primary_metric,
            success_direction: self.success_direction,
            duration_days: self.duration_days.unwrap_or(defaults.default_duration_days),
            min_sample_size: self
                .min_sample_size
                .unwrap_or(defaults.default_min_sample_size),
            significance_level,
            guardrails: self.guardrails,
            control: ExperimentVariant::new(
                Variant::Control.as_str(),
                1.0 - self.treatment_allocation,
                self.control_config,
            ),
            treatment: ExperimentVariant::new(
                Variant::Treatment.as_str(),
                self.treatment_allocation,
                self.treatment_config,
            ),
            result: None,
            created_at: Utc::now(),
            started_at: None,
            concluded_at: None,
        })
    }
}
