//! Control-loop scenarios across multiple ticks.

use llm_guardian_healing::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_incident_then_recovery() {
    let system = SelfHealingSystem::default();

    let incident = HealthSignal {
        error_rate: 0.10,
        latency_p95_ms: 700.0,
        ..Default::default()
    };
    let record = system.monitor_and_heal(&incident);
    assert_eq!(incident.detect_issue(), Some(HealthIssue::HighErrorRate));
    assert_eq!(
        record.actions_taken,
        vec![RemediationAction::ScaleUp, RemediationAction::AlertTeam]
    );
    assert_eq!(system.scale_factor(), 2);

    // error rate recovers, latency is now the top issue
    let record = system.monitor_and_heal(&HealthSignal {
        latency_p95_ms: 700.0,
        ..Default::default()
    });
    assert_eq!(record.issue, Some(HealthIssue::HighLatency));
    assert_eq!(system.scale_factor(), 3);
    assert_eq!(system.cache_ttl_multiplier(), 1.5);

    let record = system.monitor_and_heal(&HealthSignal::default());
    assert_eq!(record.actions_taken, vec![RemediationAction::NoAction]);
    assert_eq!(system.history().len(), 2);
}

#[test]
fn test_external_effectors_receive_intents_in_order() {
    let system = SelfHealingSystem::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    for action in [
        RemediationAction::RouteToFastModel,
        RemediationAction::AggressiveCache,
    ] {
        let log = Arc::clone(&log);
        system.register_handler(action, move || log.lock().unwrap().push(action));
    }

    system.monitor_and_heal(&HealthSignal {
        avg_cost_per_query: 0.25,
        ..Default::default()
    });

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            RemediationAction::RouteToFastModel,
            RemediationAction::AggressiveCache
        ]
    );
    let status = system.get_status();
    assert_eq!(status.routing_mode, RoutingMode::Balanced);
    assert_eq!(status.cache_ttl_multiplier, 1.0);
    assert_eq!(status.registered_handlers.len(), 2);
}

#[test]
fn test_custom_thresholds_from_config() {
    let config = HealingConfig {
        thresholds: HealthThresholds {
            max_latency_p95_ms: 150.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let system = SelfHealingSystem::new(config);
    let record = system.monitor_and_heal(&HealthSignal::default());
    assert_eq!(record.issue, Some(HealthIssue::HighLatency));
}

#[test]
fn test_concurrent_ticks() {
    let system = Arc::new(SelfHealingSystem::default());
    let alerts = Arc::new(AtomicUsize::new(0));
    {
        let alerts = Arc::clone(&alerts);
        system.register_handler(RemediationAction::AlertTeam, move || {
            alerts.fetch_add(1, Ordering::SeqCst);
        });
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let system = Arc::clone(&system);
            thread::spawn(move || {
                for _ in 0..25 {
                    system.monitor_and_heal(&HealthSignal {
                        error_rate: 0.2,
                        ..Default::default()
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(system.scale_factor(), 101);
    assert_eq!(alerts.load(Ordering::SeqCst), 100);
    assert_eq!(system.history().len(), 100);
}
