//! Experiment registry and analysis.

use crate::assignment::{bucket_for, variant_for_bucket};
use crate::experiment::{
    Decision, Experiment, ExperimentResult, ExperimentSpec, ExperimentStatus, Variant,
};
use crate::guardrails::{AllowAllGuardrails, GuardrailCheck};
use crate::stats::{cohens_d, improvement_pct, two_sided_p_value, welch_t};
use chrono::Utc;
use dashmap::DashMap;
use llm_guardian_core::{config::ExperimentConfig, stats::mean, stats::round_to, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Samples each arm needs before a test statistic is computed
const MIN_SAMPLES_PER_VARIANT: usize = 2;

/// Manager-level counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub experiments: usize,
    pub draft: usize,
    pub running: usize,
    pub concluded: usize,
    pub assignments: u64,
    pub samples_recorded: u64,
    pub analyses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    assignments: AtomicU64,
    samples_recorded: AtomicU64,
    analyses: AtomicU64,
}

/// Owns every experiment and runs their analyses.
///
/// All methods take `&self`; experiments are stored in a [`DashMap`] so
/// assignment and metric recording for different experiments never contend.
pub struct ExperimentManager {
    defaults: ExperimentConfig,
    experiments: DashMap<String, Experiment>,
    guardrails: Arc<dyn GuardrailCheck>,
    counters: Counters,
}

impl std::fmt::Debug for ExperimentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentManager")
            .field("defaults", &self.defaults)
            .field("experiments", &self.experiments.len())
            .field("counters", &self.counters)
            .finish()
    }
}

impl Default for ExperimentManager {
    fn default() -> Self {
        Self::new(ExperimentConfig::default())
    }
}

impl ExperimentManager {
    /// Manager whose guardrails always pass
    pub fn new(defaults: ExperimentConfig) -> Self {
        Self::with_guardrails(defaults, Arc::new(AllowAllGuardrails))
    }

    pub fn with_guardrails(defaults: ExperimentConfig, guardrails: Arc<dyn GuardrailCheck>) -> Self {
        info!(
            significance_level = defaults.default_significance_level,
            min_sample_size = defaults.default_min_sample_size,
            "Creating experiment manager"
        );
        Self {
            defaults,
            experiments: DashMap::new(),
            guardrails,
            counters: Counters::default(),
        }
    }

    pub fn defaults(&self) -> &ExperimentConfig {
        &self.defaults
    }

    /// Register a draft experiment. An existing experiment with the same id
    /// is replaced.
    pub fn create_experiment(&self, spec: ExperimentSpec) -> Result<Experiment> {
        let experiment = spec.build(&self.defaults)?;
        let id = experiment.experiment_id.clone();

        if self.experiments.contains_key(&id) {
            warn!(experiment_id = %id, "Overwriting existing experiment");
        }
        info!(
            experiment_id = %id,
            name = %experiment.name,
            primary_metric = %experiment.primary_metric,
            treatment_allocation = experiment.treatment.allocation,
            "Experiment created"
        );

        self.experiments.insert(id, experiment.clone());
        Ok(experiment)
    }

    /// Move a draft experiment to running
    pub fn start_experiment(&self, experiment_id: &str) -> Result<()> {
        let mut experiment = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| Error::not_found(format!("experiment '{}'", experiment_id)))?;

        if experiment.status != ExperimentStatus::Draft {
            return Err(Error::invalid_state(format!(
                "experiment '{}' is {}, only draft experiments can be started",
                experiment_id, experiment.status
            )));
        }

        experiment.status = ExperimentStatus::Running;
        experiment.started_at = Some(Utc::now());
        info!(experiment_id, "Experiment started");
        Ok(())
    }

    /// Deterministic variant for a user. Falls back to control when the
    /// experiment is unknown or not running.
    pub fn assign_variant(&self, experiment_id: &str, user_id: &str) -> Variant {
        let Some(experiment) = self.experiments.get(experiment_id) else {
            debug!(experiment_id, "Unknown experiment, assigning control");
            return Variant::Control;
        };
        if !experiment.is_running() {
            return Variant::Control;
        }

        self.counters.assignments.fetch_add(1, Ordering::Relaxed);
        variant_for_bucket(
            bucket_for(experiment_id, user_id),
            experiment.treatment.allocation,
        )
    }

    /// Append an outcome sample to a variant. Unknown experiments or
    /// variants are ignored.
    pub fn record_metric(&self, experiment_id: &str, variant_name: &str, value: f64) {
        let Some(mut experiment) = self.experiments.get_mut(experiment_id) else {
            debug!(experiment_id, "Dropping sample for unknown experiment");
            return;
        };
        match experiment.variant_mut(variant_name) {
            Some(variant) => {
                variant.metrics.push(value);
                self.counters.samples_recorded.fetch_add(1, Ordering::Relaxed);
            }
            None => debug!(experiment_id, variant_name, "Dropping sample for unknown variant"),
        }
    }

    /// Run the statistical test and store the decision on the experiment
    pub fn analyze(&self, experiment_id: &str) -> Result<ExperimentResult> {
        // Work on a snapshot so the guardrail check never runs under the map lock
        let snapshot = self
            .experiments
            .get(experiment_id)
            .map(|e| e.clone())
            .ok_or_else(|| Error::not_found(format!("experiment '{}'", experiment_id)))?;
        self.counters.analyses.fetch_add(1, Ordering::Relaxed);

        let control = &snapshot.control.metrics;
        let treatment = &snapshot.treatment.metrics;
        let control_mean = mean(control);
        let treatment_mean = mean(treatment);

        if control.len() < MIN_SAMPLES_PER_VARIANT || treatment.len() < MIN_SAMPLES_PER_VARIANT {
            let result = ExperimentResult {
                experiment_id: experiment_id.to_string(),
                control_mean,
                treatment_mean,
                control_n: control.len(),
                treatment_n: treatment.len(),
                t_statistic: 0.0,
                p_value: 1.0,
                cohens_d: 0.0,
                improvement_pct: 0.0,
                is_significant: false,
                guardrails_passed: false,
                decision: Decision::ExtendExperiment,
                analyzed_at: Utc::now(),
            };
            info!(
                experiment_id,
                control_n = control.len(),
                treatment_n = treatment.len(),
                "Not enough samples to analyze, extending experiment"
            );
            self.persist(experiment_id, &result, false);
            return Ok(result);
        }

        let t_statistic = welch_t(control, treatment);
        let p_value = round_to(two_sided_p_value(t_statistic), 6);
        let d = cohens_d(control, treatment);
        let improvement = round_to(improvement_pct(control_mean, treatment_mean), 2);
        let is_significant = p_value < snapshot.significance_level;

        let mut guardrails_passed = false;
        let decision = if !is_significant {
            if snapshot.total_samples() < snapshot.min_sample_size {
                Decision::ExtendExperiment
            } else {
                Decision::KeepControl
            }
        } else if snapshot.success_direction.is_improvement(improvement) {
            guardrails_passed = self.guardrails.check(&snapshot);
            if guardrails_passed {
                Decision::DeployTreatment
            } else {
                warn!(experiment_id, "Guardrails failed, keeping control");
                Decision::KeepControl
            }
        } else {
            Decision::KeepControl
        };

        let result = ExperimentResult {
            experiment_id: experiment_id.to_string(),
            control_mean,
            treatment_mean,
            control_n: control.len(),
            treatment_n: treatment.len(),
            t_statistic: round_to(t_statistic, 4),
            p_value,
            cohens_d: round_to(d, 4),
            improvement_pct: improvement,
            is_significant,
            guardrails_passed,
            decision,
            analyzed_at: Utc::now(),
        };

        info!(
            experiment_id,
            t_statistic = result.t_statistic,
            p_value = result.p_value,
            cohens_d = result.cohens_d,
            improvement_pct = result.improvement_pct,
            decision = %decision,
            "Experiment analyzed"
        );
        metrics::counter!(
            "guardian_experiment_decisions_total",
            "decision" => decision.as_str()
        )
        .increment(1);

        self.persist(experiment_id, &result, true);
        Ok(result)
    }

    fn persist(&self, experiment_id: &str, result: &ExperimentResult, conclude: bool) {
        // the experiment may have been replaced concurrently; the result still
        // belongs under this id
        if let Some(mut experiment) = self.experiments.get_mut(experiment_id) {
            experiment.result = Some(result.clone());
            if conclude {
                experiment.status = ExperimentStatus::Concluded;
                experiment.concluded_at = Some(result.analyzed_at);
            }
        }
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Option<Experiment> {
        self.experiments.get(experiment_id).map(|e| e.clone())
    }

    /// All experiments, ordered by id
    pub fn list_experiments(&self) -> Vec<Experiment> {
        let mut experiments: Vec<_> = self.experiments.iter().map(|e| e.clone()).collect();
        experiments.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        experiments
    }

    /// Last stored analysis result
    pub fn result(&self, experiment_id: &str) -> Option<ExperimentResult> {
        self.experiments
            .get(experiment_id)
            .and_then(|e| e.result.clone())
    }

    pub fn stats(&self) -> ManagerStats {
        let mut stats = ManagerStats {
            experiments: self.experiments.len(),
            assignments: self.counters.assignments.load(Ordering::Relaxed),
            samples_recorded: self.counters.samples_recorded.load(Ordering::Relaxed),
            analyses: self.counters.analyses.load(Ordering::Relaxed),
            ..Default::default()
        };
        for experiment in self.experiments.iter() {
            match experiment.status {
                ExperimentStatus::Draft => stats.draft += 1,
                ExperimentStatus::Running => stats.running += 1,
                ExperimentStatus::Concluded => stats.concluded += 1,
            }
        }
        stats
    }
}
