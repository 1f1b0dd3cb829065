use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the monitoring pipeline.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_log_emitted(&self, level: &str, category: &str) {
        counter!("pipeline_logs_emitted_total", "level" => level.to_string(), "category" => category.to_string()).increment(1);
    }

    pub fn record_log_sampled_out(&self, level: &str) {
        counter!("pipeline_logs_sampled_out_total", "level" => level.to_string()).increment(1);
    }

    pub fn record_log_dropped(&self, reason: &str) {
        counter!("pipeline_logs_dropped_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn record_batch_flushed(&self, entry_count: u64, duration_ms: f64) {
        counter!("pipeline_log_batches_flushed_total").increment(1);
        histogram!("pipeline_log_batch_size").record(entry_count as f64);
        histogram!("pipeline_log_flush_duration_ms").record(duration_ms);
    }

    pub fn record_flush_failure(&self) {
        counter!("pipeline_log_flush_failures_total").increment(1);
    }

    pub fn record_error_tracked(&self, category: &str, severity: &str, is_new: bool) {
        counter!("pipeline_errors_tracked_total", "category" => category.to_string(), "severity" => severity.to_string(), "new" => is_new.to_string()).increment(1);
    }

    pub fn record_error_rate_limited(&self) {
        counter!("pipeline_errors_rate_limited_total").increment(1);
    }

    pub fn record_alert_delivery(&self, channel: &str, outcome: &str) {
        counter!("pipeline_alert_deliveries_total", "channel" => channel.to_string(), "outcome" => outcome.to_string()).increment(1);
    }

    pub fn record_alert_retry(&self, channel: &str) {
        counter!("pipeline_alert_retries_total", "channel" => channel.to_string()).increment(1);
    }

    pub fn record_health_check(&self, name: &str, status: &str, duration_ms: f64) {
        counter!("pipeline_health_checks_total", "name" => name.to_string(), "status" => status.to_string()).increment(1);
        histogram!("pipeline_health_check_duration_ms", "name" => name.to_string()).record(duration_ms);
    }

    pub fn record_store_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("pipeline_store_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("pipeline_store_operation_duration_ms", "operation" => operation.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("pipeline_logs_emitted_total", Unit::Count, "Log entries emitted after sampling");
    describe_counter!("pipeline_logs_sampled_out_total", Unit::Count, "Log entries dropped by sampling");
    describe_counter!("pipeline_logs_dropped_total", Unit::Count, "Log entries dropped before delivery");
    describe_counter!("pipeline_log_batches_flushed_total", Unit::Count, "Log batches delivered to the aggregation sink");
    describe_counter!("pipeline_log_flush_failures_total", Unit::Count, "Failed log batch deliveries");
    describe_histogram!("pipeline_log_batch_size", Unit::Count, "Entries per flushed batch");
    describe_histogram!("pipeline_log_flush_duration_ms", Unit::Milliseconds, "Log batch flush latency in milliseconds");

    describe_counter!("pipeline_errors_tracked_total", Unit::Count, "Errors tracked, by category and severity");
    describe_counter!("pipeline_errors_rate_limited_total", Unit::Count, "Error occurrences over the per-fingerprint rate limit");

    describe_counter!("pipeline_alert_deliveries_total", Unit::Count, "Alert channel delivery attempts by outcome");
    describe_counter!("pipeline_alert_retries_total", Unit::Count, "Alert delivery retries");

    describe_counter!("pipeline_health_checks_total", Unit::Count, "Health checks run, by status");
    describe_histogram!("pipeline_health_check_duration_ms", Unit::Milliseconds, "Health check latency in milliseconds");

    describe_counter!("pipeline_store_operations_total", Unit::Count, "Shared store operations");
    describe_histogram!("pipeline_store_operation_duration_ms", Unit::Milliseconds, "Shared store operation latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
