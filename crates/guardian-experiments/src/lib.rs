//! # Guardian Experiments
//!
//! Two-armed (control / treatment) A/B experiments:
//!
//! - deterministic SHA-256 bucketing of users into variants
//! - per-variant outcome samples
//! - Welch's t-test with a normal-approximation p-value, Cohen's d and a
//!   ship / hold / extend decision
//!
//! Lifecycle: `Draft --start--> Running --analyze--> Concluded`.

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod assignment;
pub mod experiment;
pub mod guardrails;
pub mod manager;
pub mod stats;

pub use experiment::{
    Decision, Experiment, ExperimentResult, ExperimentSpec, ExperimentStatus, ExperimentVariant,
    SuccessDirection, Variant,
};
pub use guardrails::{AllowAllGuardrails, Guardrail, GuardrailCheck};
pub use manager::ExperimentManager;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::assignment::bucket_for;
    pub use crate::experiment::{
        Decision, Experiment, ExperimentResult, ExperimentSpec, ExperimentStatus,
        ExperimentVariant, SuccessDirection, Variant,
    };
    pub use crate::guardrails::{AllowAllGuardrails, Guardrail, GuardrailCheck};
    pub use crate::manager::{ExperimentManager, ManagerStats};
}
