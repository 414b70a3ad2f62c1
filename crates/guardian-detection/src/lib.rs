//! # Guardian Detection
//!
//! Statistical detectors over live metric streams:
//!
//! - [`window::MetricWindow`]: bounded FIFO of recent values for one metric
//! - [`anomaly::AnomalyDetector`]: z-score of each new value against the
//!   metric's own history
//! - [`drift::DriftMonitor`]: KL divergence and PSI between a production and
//!   a reference sample

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod anomaly;
pub mod drift;
pub mod window;

pub use anomaly::{AnomalyAlert, AnomalyDetector, MetricStats};
pub use drift::{calculate_kl_divergence, calculate_psi, DriftMonitor, DriftReport};
pub use window::MetricWindow;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::anomaly::{AnomalyAlert, AnomalyDetector, DetectorStats, MetricStats};
    pub use crate::drift::{
        calculate_kl_divergence, calculate_psi, to_distribution, DriftDetails, DriftMonitor,
        DriftReport,
    };
    pub use crate::window::MetricWindow;
    pub use llm_guardian_core::types::Severity;
}
