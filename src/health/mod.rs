use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HealthSettings;
use crate::metrics::get_metrics;
use crate::store::SharedStore;

/// Health status of a probe or of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// What a probe reports back; the registry adds naming and timing.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ProbeOutcome {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            metadata: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// An asynchronous health probe. Probes handle their own retries if they
/// want any; the registry only enforces the timeout envelope.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ProbeOutcome> + Send,
{
    async fn check(&self) -> ProbeOutcome {
        (self.0)().await
    }
}

/// Completed result of one named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Aggregated health report: all check results plus the derived overall
/// status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn new(uptime_seconds: u64, checks: Vec<HealthCheck>) -> Self {
        let status = Self::aggregate_status(&checks);
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
            checks,
        }
    }

    /// Any unhealthy check forces the aggregate unhealthy; otherwise any
    /// degraded check forces degraded; an empty set is healthy. The
    /// reduction is order-independent.
    fn aggregate_status(checks: &[HealthCheck]) -> HealthStatus {
        let has_unhealthy = checks.iter().any(|c| c.status.is_unhealthy());
        let has_degraded = checks.iter().any(|c| c.status.is_degraded());

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Registry of named probes. `run_all` runs every probe concurrently,
/// each raced against the per-check timeout; a probe that does not settle
/// in time is reported unhealthy with a response time equal to the
/// timeout, and its eventual outcome is discarded.
pub struct HealthRegistry {
    checks: Vec<(String, Arc<dyn Probe>)>,
    timeout: Duration,
    start_time: std::time::Instant,
}

impl HealthRegistry {
    pub fn new(settings: &HealthSettings) -> Self {
        Self {
            checks: Vec::new(),
            timeout: Duration::from_millis(settings.check_timeout_ms),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, probe: Arc<dyn Probe>) {
        self.checks.push((name.into(), probe));
    }

    /// Registers a closure-based probe.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeOutcome> + Send + 'static,
    {
        self.register(name, Arc::new(FnProbe(probe)));
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Runs every registered probe concurrently and aggregates.
    pub async fn run_all(&self) -> HealthReport {
        let runs = self
            .checks
            .iter()
            .map(|(name, probe)| self.run_probe(name, probe.as_ref()));
        let checks = futures::future::join_all(runs).await;

        HealthReport::new(self.start_time.elapsed().as_secs(), checks)
    }

    /// Runs a single probe by name under the same timeout envelope.
    pub async fn run_one(&self, name: &str) -> Option<HealthCheck> {
        let (check_name, probe) = self.checks.iter().find(|(n, _)| n == name)?;
        Some(self.run_probe(check_name, probe.as_ref()).await)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    async fn run_probe(&self, name: &str, probe: &dyn Probe) -> HealthCheck {
        let start = std::time::Instant::now();
        let check = match tokio::time::timeout(self.timeout, probe.check()).await {
            Ok(outcome) => HealthCheck {
                name: name.to_string(),
                status: outcome.status,
                response_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                message: outcome.message,
                timestamp: Utc::now(),
                metadata: outcome.metadata,
            },
            Err(_) => HealthCheck {
                name: name.to_string(),
                status: HealthStatus::Unhealthy,
                response_time_ms: self.timeout.as_secs_f64() * 1000.0,
                message: Some(format!(
                    "Check timed out after {}ms",
                    self.timeout.as_millis()
                )),
                timestamp: Utc::now(),
                metadata: None,
            },
        };

        get_metrics().record_health_check(name, check.status.as_str(), check.response_time_ms);
        check
    }
}

/// Connectivity probe for the shared store: a PING within the latency
/// threshold is healthy, a slow PING is degraded, a failed one unhealthy.
pub struct StoreProbe {
    store: Arc<dyn SharedStore>,
    degraded_latency_ms: f64,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn SharedStore>, degraded_latency_ms: f64) -> Self {
        Self {
            store,
            degraded_latency_ms,
        }
    }
}

#[async_trait]
impl Probe for StoreProbe {
    async fn check(&self) -> ProbeOutcome {
        let start = std::time::Instant::now();
        match self.store.ping().await {
            Ok(()) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > self.degraded_latency_ms {
                    ProbeOutcome::degraded("High latency detected")
                        .with_metadata(serde_json::json!({ "latency_ms": latency }))
                } else {
                    ProbeOutcome::healthy()
                }
            }
            Err(e) => ProbeOutcome::unhealthy(format!("PING failed: {}", e)),
        }
    }
}
