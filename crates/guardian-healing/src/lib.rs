//! # Guardian Healing
//!
//! Turns an aggregated [`HealthSignal`] into at most one [`HealthIssue`] and
//! applies that issue's fixed list of [`RemediationAction`]s. Each action is
//! either delegated to a caller-registered handler or applied to the
//! in-process knobs (cache TTL multiplier, routing mode, scale factor).

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod actions;
pub mod signal;
pub mod system;

pub use actions::{actions_for, RemediationAction};
pub use signal::{HealthIssue, HealthSignal};
pub use system::{HealingStatus, RemediationRecord, RoutingMode, SelfHealingSystem};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::actions::{actions_for, RemediationAction};
    pub use crate::signal::{HealthIssue, HealthSignal};
    pub use crate::system::{
        HealingStatus, RemediationHandler, RemediationRecord, RoutingMode, SelfHealingSystem,
    };
    pub use llm_guardian_core::config::{HealingConfig, HealthThresholds};
}
