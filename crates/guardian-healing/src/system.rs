//! The self-healing control loop.

use crate::actions::{actions_for, RemediationAction};
use crate::signal::{HealthIssue, HealthSignal};
use chrono::{DateTime, Utc};
use llm_guardian_core::{config::HealingConfig, record_log::RecordLog};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Caller-supplied effector for an action
pub type RemediationHandler = Arc<dyn Fn() + Send + Sync>;

/// Model routing policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    Balanced,
    Conservative,
    FastModelFirst,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balanced => write!(f, "balanced"),
            Self::Conservative => write!(f, "conservative"),
            Self::FastModelFirst => write!(f, "fast_model_first"),
        }
    }
}

/// One healing tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub record_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// `None` for a healthy tick
    pub issue: Option<HealthIssue>,
    pub actions_taken: Vec<RemediationAction>,
    pub resolved: bool,
    pub details: String,
}

/// Snapshot of the healing knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingStatus {
    pub cache_ttl_multiplier: f64,
    pub routing_mode: RoutingMode,
    pub scale_factor: u32,
    pub remediations_applied: u64,
    pub registered_handlers: Vec<RemediationAction>,
}

#[derive(Debug, Clone, PartialEq)]
struct Knobs {
    cache_ttl_multiplier: f64,
    routing_mode: RoutingMode,
    scale_factor: u32,
}

impl Default for Knobs {
    fn default() -> Self {
        Self {
            cache_ttl_multiplier: 1.0,
            routing_mode: RoutingMode::Balanced,
            scale_factor: 1,
        }
    }
}

/// Classifies health signals and applies remediations.
///
/// Knobs persist across ticks until [`reset`](Self::reset).
pub struct SelfHealingSystem {
    config: HealingConfig,
    knobs: RwLock<Knobs>,
    handlers: RwLock<HashMap<RemediationAction, RemediationHandler>>,
    history: RwLock<RecordLog<RemediationRecord>>,
    remediations_applied: AtomicU64,
}

impl fmt::Debug for SelfHealingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfHealingSystem")
            .field("config", &self.config)
            .field("status", &self.get_status())
            .finish()
    }
}

impl Default for SelfHealingSystem {
    fn default() -> Self {
        Self::new(HealingConfig::default())
    }
}

impl SelfHealingSystem {
    /// System with an unbounded remediation history
    pub fn new(config: HealingConfig) -> Self {
        Self::with_retention(config, None)
    }

    pub fn with_retention(config: HealingConfig, max_remediations: Option<usize>) -> Self {
        info!(
            max_error_rate = config.thresholds.max_error_rate,
            max_latency_p95_ms = config.thresholds.max_latency_p95_ms,
            min_faithfulness = config.thresholds.min_faithfulness,
            "Creating self-healing system"
        );
        Self {
            config,
            knobs: RwLock::new(Knobs::default()),
            handlers: RwLock::new(HashMap::new()),
            history: RwLock::new(RecordLog::with_retention(max_remediations)),
            remediations_applied: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// Route `action` to `handler` instead of the built-in knob change
    pub fn register_handler<F>(&self, action: RemediationAction, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        info!(action = %action, "Registering remediation handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(action, Arc::new(handler));
    }

    /// Returns whether a handler was registered
    pub fn unregister_handler(&self, action: RemediationAction) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&action)
            .is_some()
    }

    /// Classify `signal` and apply the remediation for its issue.
    ///
    /// Healthy ticks return a `NoAction` record that is not kept in history.
    pub fn monitor_and_heal(&self, signal: &HealthSignal) -> RemediationRecord {
        let Some(issue) = signal.detect_issue_with(&self.config.thresholds) else {
            debug!("Health signal within thresholds");
            return RemediationRecord {
                record_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                issue: None,
                actions_taken: vec![RemediationAction::NoAction],
                resolved: true,
                details: "all health metrics within thresholds".to_string(),
            };
        };

        let details = signal.describe(issue, &self.config.thresholds);
        let actions = actions_for(issue);
        warn!(issue = %issue, details = %details, "Health issue detected, remediating");

        for action in actions {
            self.apply(*action);
        }

        let record = RemediationRecord {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            issue: Some(issue),
            actions_taken: actions.to_vec(),
            resolved: true,
            details,
        };

        metrics::counter!("guardian_remediations_total", "issue" => issue.as_str()).increment(1);
        self.remediations_applied.fetch_add(1, Ordering::Relaxed);
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());

        record
    }

    fn apply(&self, action: RemediationAction) {
        // clone out so the handler runs without holding the registry lock
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&action)
            .cloned();
        if let Some(handler) = handler {
            debug!(action = %action, "Invoking registered handler");
            handler();
            return;
        }

        let mut knobs = self.knobs.write().unwrap_or_else(PoisonError::into_inner);
        match action {
            RemediationAction::ScaleUp => {
                knobs.scale_factor = knobs.scale_factor.saturating_add(1);
                info!(scale_factor = knobs.scale_factor, "Scaled up");
            }
            RemediationAction::IncreaseCacheTtl => {
                knobs.cache_ttl_multiplier = (knobs.cache_ttl_multiplier
                    * self.config.cache_ttl_step)
                    .min(self.config.cache_ttl_cap);
                info!(
                    cache_ttl_multiplier = knobs.cache_ttl_multiplier,
                    "Increased cache TTL"
                );
            }
            RemediationAction::AggressiveCache => {
                knobs.cache_ttl_multiplier = (knobs.cache_ttl_multiplier
                    * self.config.aggressive_cache_step)
                    .min(self.config.aggressive_cache_cap);
                info!(
                    cache_ttl_multiplier = knobs.cache_ttl_multiplier,
                    "Enabled aggressive caching"
                );
            }
            RemediationAction::ConservativeMode => {
                knobs.routing_mode = RoutingMode::Conservative;
                info!(routing_mode = %knobs.routing_mode, "Switched routing mode");
            }
            RemediationAction::RouteToFastModel => {
                knobs.routing_mode = RoutingMode::FastModelFirst;
                info!(routing_mode = %knobs.routing_mode, "Switched routing mode");
            }
            RemediationAction::AlertTeam => {
                warn!("Alerting on-call team");
            }
            RemediationAction::NoAction => {}
        }
    }

    /// Restore default knobs. History is kept.
    pub fn reset(&self) {
        *self.knobs.write().unwrap_or_else(PoisonError::into_inner) = Knobs::default();
        info!("Self-healing knobs reset");
    }

    pub fn history(&self) -> Vec<RemediationRecord> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Take the retained history, leaving it empty
    pub fn drain_history(&self) -> Vec<RemediationRecord> {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
    }

    pub fn cache_ttl_multiplier(&self) -> f64 {
        self.knobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_ttl_multiplier
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.knobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .routing_mode
    }

    pub fn scale_factor(&self) -> u32 {
        self.knobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .scale_factor
    }

    pub fn get_status(&self) -> HealingStatus {
        let knobs = self
            .knobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut registered_handlers: Vec<_> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        registered_handlers.sort_by_key(|a| a.as_str());

        HealingStatus {
            cache_ttl_multiplier: knobs.cache_ttl_multiplier,
            routing_mode: knobs.routing_mode,
            scale_factor: knobs.scale_factor,
            remediations_applied: self.remediations_applied.load(Ordering::Relaxed),
            registered_handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn latency_signal() -> HealthSignal {
        HealthSignal {
            latency_p95_ms: 800.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_tick_is_not_recorded() {
        let system = SelfHealingSystem::default();
        let record = system.monitor_and_heal(&HealthSignal::default());
        assert_eq!(record.issue, None);
        assert_eq!(record.actions_taken, vec![RemediationAction::NoAction]);
        assert!(record.resolved);
        assert!(system.history().is_empty());
        assert_eq!(system.get_status().remediations_applied, 0);
    }

    #[test]
    fn test_high_error_rate_scales_up() {
        let system = SelfHealingSystem::default();
        let record = system.monitor_and_heal(&HealthSignal {
            error_rate: 0.10,
            latency_p95_ms: 700.0,
            ..Default::default()
        });
        assert_eq!(record.issue, Some(HealthIssue::HighErrorRate));
        assert_eq!(
            record.actions_taken,
            vec![RemediationAction::ScaleUp, RemediationAction::AlertTeam]
        );
        assert_eq!(system.scale_factor(), 2);
        assert_eq!(system.history(), vec![record]);
    }

    #[test]
    fn test_cache_ttl_is_capped() {
        let system = SelfHealingSystem::default();
        let low_cache = HealthSignal {
            cache_hit_rate: 0.1,
            ..Default::default()
        };
        system.monitor_and_heal(&low_cache);
        assert!((system.cache_ttl_multiplier() - 1.5).abs() < 1e-12);
        for _ in 0..10 {
            system.monitor_and_heal(&low_cache);
        }
        assert_eq!(system.cache_ttl_multiplier(), 5.0);
    }

    #[test]
    fn test_high_cost_routes_and_caches() {
        let system = SelfHealingSystem::default();
        let expensive = HealthSignal {
            avg_cost_per_query: 0.5,
            ..Default::default()
        };
        system.monitor_and_heal(&expensive);
        assert_eq!(system.routing_mode(), RoutingMode::FastModelFirst);
        assert_eq!(system.cache_ttl_multiplier(), 2.0);
        for _ in 0..5 {
            system.monitor_and_heal(&expensive);
        }
        assert_eq!(system.cache_ttl_multiplier(), 10.0);
    }

    #[test]
    fn test_low_quality_goes_conservative() {
        let system = SelfHealingSystem::default();
        system.monitor_and_heal(&HealthSignal {
            avg_ragas_faithfulness: 0.6,
            ..Default::default()
        });
        assert_eq!(system.routing_mode(), RoutingMode::Conservative);
        assert_eq!(system.scale_factor(), 1);
    }

    #[test]
    fn test_registered_handler_replaces_builtin() {
        let system = SelfHealingSystem::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        system.register_handler(RemediationAction::ScaleUp, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        system.monitor_and_heal(&latency_signal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(system.scale_factor(), 1);
        // the unhandled action still uses the built-in
        assert_eq!(system.cache_ttl_multiplier(), 1.5);

        assert!(system.unregister_handler(RemediationAction::ScaleUp));
        assert!(!system.unregister_handler(RemediationAction::ScaleUp));
        system.monitor_and_heal(&latency_signal());
        assert_eq!(system.scale_factor(), 2);
    }

    #[test]
    fn test_handler_may_reenter_system() {
        let system = Arc::new(SelfHealingSystem::default());
        let inner = Arc::clone(&system);
        system.register_handler(RemediationAction::AlertTeam, move || {
            let _ = inner.get_status();
        });
        let record = system.monitor_and_heal(&HealthSignal {
            error_rate: 0.5,
            ..Default::default()
        });
        assert_eq!(record.issue, Some(HealthIssue::HighErrorRate));
        assert_eq!(
            system.get_status().registered_handlers,
            vec![RemediationAction::AlertTeam]
        );
    }

    #[test]
    fn test_reset_keeps_history() {
        let system = SelfHealingSystem::default();
        system.monitor_and_heal(&latency_signal());
        system.monitor_and_heal(&HealthSignal {
            avg_cost_per_query: 0.5,
            ..Default::default()
        });
        system.reset();

        let status = system.get_status();
        assert_eq!(status.scale_factor, 1);
        assert_eq!(status.cache_ttl_multiplier, 1.0);
        assert_eq!(status.routing_mode, RoutingMode::Balanced);
        assert_eq!(status.remediations_applied, 2);
        assert_eq!(system.history().len(), 2);
    }

    #[test]
    fn test_history_retention_and_drain() {
        let system = SelfHealingSystem::with_retention(HealingConfig::default(), Some(2));
        for _ in 0..5 {
            system.monitor_and_heal(&latency_signal());
        }
        assert_eq!(system.history().len(), 2);
        assert_eq!(system.drain_history().len(), 2);
        assert!(system.history().is_empty());
        assert_eq!(system.get_status().remediations_applied, 5);
    }
}
