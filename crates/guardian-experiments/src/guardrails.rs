//! Guardrail evaluation.
//!
//! Guardrails are declared on the experiment as data. Whether they hold is
//! decided by an injected [`GuardrailCheck`]; the default implementation
//! passes every experiment.

use crate::experiment::Experiment;
use serde::{Deserialize, Serialize};

/// A secondary metric that must not regress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardrail {
    pub metric: String,
    /// Largest tolerated regression of `metric`, in percent
    pub max_regression_pct: f64,
}

impl Guardrail {
    pub fn new(metric: impl Into<String>, max_regression_pct: f64) -> Self {
        Self {
            metric: metric.into(),
            max_regression_pct,
        }
    }
}

/// Decides whether an experiment's guardrails hold
pub trait GuardrailCheck: Send + Sync {
    fn check(&self, experiment: &Experiment) -> bool;
}

/// Passes every experiment
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGuardrails;

impl GuardrailCheck for AllowAllGuardrails {
    fn check(&self, _experiment: &Experiment) -> bool {
        true
    }
}

impl<F> GuardrailCheck for F
where
    F: Fn(&Experiment) -> bool + Send + Sync,
{
    fn check(&self, experiment: &Experiment) -> bool {
        self(experiment)
    }
}
