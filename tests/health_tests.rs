use std::sync::Arc;
use std::time::{Duration, Instant};

use monitoring_pipeline::config::HealthSettings;
use monitoring_pipeline::health::{
    HealthRegistry, HealthStatus, Probe, ProbeOutcome, StoreProbe,
};
use monitoring_pipeline::store::SharedStore;

mod common;
use common::memory_store;

fn registry_with_timeout(timeout_ms: u64) -> HealthRegistry {
    HealthRegistry::new(&HealthSettings {
        check_timeout_ms: timeout_ms,
        ..HealthSettings::default()
    })
}

#[tokio::test]
async fn test_timeout_dominates_aggregate() {
    // One probe sleeps past the timeout, one is healthy in ~10ms, one is
    // degraded in ~20ms: overall must be unhealthy with 3 entries.
    let mut registry = registry_with_timeout(100);

    registry.register_fn("stuck", || async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        ProbeOutcome::healthy()
    });
    registry.register_fn("fast", || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ProbeOutcome::healthy()
    });
    registry.register_fn("slow", || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ProbeOutcome::degraded("latency above threshold")
    });

    let report = registry.run_all().await;

    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.checks.len(), 3);

    let stuck = report.checks.iter().find(|c| c.name == "stuck").unwrap();
    assert_eq!(stuck.status, HealthStatus::Unhealthy);
    assert!(stuck.message.as_ref().unwrap().contains("timed out"));
    assert_eq!(stuck.response_time_ms, 100.0);
}

#[tokio::test]
async fn test_never_settling_probe_finishes_within_envelope() {
    let mut registry = registry_with_timeout(100);
    registry.register_fn("hung", || std::future::pending::<ProbeOutcome>());

    let start = Instant::now();
    let report = registry.run_all().await;
    let elapsed = start.elapsed();

    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_probes_run_concurrently() {
    let mut registry = registry_with_timeout(1_000);
    for name in ["a", "b", "c", "d"] {
        registry.register_fn(name, || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ProbeOutcome::healthy()
        });
    }

    let start = Instant::now();
    let report = registry.run_all().await;

    // Four 100ms probes in parallel finish far sooner than in sequence.
    assert!(start.elapsed() < Duration::from_millis(350));
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.checks.len(), 4);
}

#[tokio::test]
async fn test_degraded_without_unhealthy() {
    let mut registry = registry_with_timeout(1_000);
    registry.register_fn("ok", || async { ProbeOutcome::healthy() });
    registry.register_fn("meh", || async { ProbeOutcome::degraded("slow") });

    let report = registry.run_all().await;
    assert_eq!(report.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_empty_registry_is_healthy() {
    let registry = registry_with_timeout(1_000);
    let report = registry.run_all().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.checks.is_empty());
}

#[tokio::test]
async fn test_run_one_enforces_timeout() {
    let mut registry = registry_with_timeout(50);
    registry.register_fn("hung", || std::future::pending::<ProbeOutcome>());

    let check = registry.run_one("hung").await.unwrap();
    assert_eq!(check.status, HealthStatus::Unhealthy);
    assert_eq!(check.response_time_ms, 50.0);
}

#[tokio::test]
async fn test_store_probe_reports_healthy_memory_store() {
    let store = memory_store();
    let probe = StoreProbe::new(store as Arc<dyn SharedStore>, 1_000.0);
    let outcome = probe.check().await;
    assert_eq!(outcome.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_report_serializes_for_dashboard() {
    let mut registry = registry_with_timeout(1_000);
    registry.register_fn("ok", || async { ProbeOutcome::healthy() });

    let report = registry.run_all().await;
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"status\":\"healthy\""));
    assert!(json.contains("\"checks\""));
    assert!(json.contains("\"response_time_ms\""));
}
