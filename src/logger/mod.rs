use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::LoggerSettings;
use crate::logger::worker::{FlushWorker, WorkerMessage};
use crate::metrics::get_metrics;
use crate::models::{ErrorDetail, LogCategory, LogEntry, LogLevel};
use crate::store::SharedStore;

pub mod init;
pub mod redaction;
pub mod sink;
mod worker;

pub use init::{init_logging, mask_address, mask_sensitive, LogConfig, LogFormat};
pub use redaction::{redact_context, safe_serialize, DEPTH_MARKER, REDACTED, TRUNCATION_MARKER};
pub use sink::{HttpLogSink, LogSink};

/// Counters exposed to the monitoring snapshot consumer.
#[derive(Debug, Default)]
pub struct LogStats {
    emitted: AtomicU64,
    sampled_out: AtomicU64,
    dropped: AtomicU64,
    batches_flushed: AtomicU64,
    entries_flushed: AtomicU64,
    flush_failures: AtomicU64,
    store_errors: AtomicU64,
}

impl LogStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sampled_out(&self) {
        self.sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_flushed(&self, entries: u64) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.entries_flushed.fetch_add(entries, Ordering::Relaxed);
    }

    pub fn record_flush_failure(&self, entries: u64) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(entries, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LogStatsSnapshot {
        LogStatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            sampled_out: self.sampled_out.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            entries_flushed: self.entries_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`LogStats`].
#[derive(Debug, Clone, Serialize)]
pub struct LogStatsSnapshot {
    pub emitted: u64,
    pub sampled_out: u64,
    pub dropped: u64,
    pub batches_flushed: u64,
    pub entries_flushed: u64,
    pub flush_failures: u64,
    pub store_errors: u64,
}

/// The structured logger. `log` and the derived helpers are synchronous and
/// fire-and-continue: redaction, sampling, and the process-local tracing
/// event happen inline; persistence and sink delivery are handed to a
/// background worker over a bounded channel.
pub struct Logger {
    settings: LoggerSettings,
    tx: mpsc::Sender<WorkerMessage>,
    stats: Arc<LogStats>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Logger {
    pub fn new(
        settings: LoggerSettings,
        store: Option<Arc<dyn SharedStore>>,
        sink: Option<Arc<dyn LogSink>>,
    ) -> Self {
        let stats = Arc::new(LogStats::new());
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let handle = FlushWorker::spawn(rx, settings.clone(), store, sink, stats.clone());

        Self {
            settings,
            tx,
            stats,
            worker: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Records a structured log entry.
    ///
    /// The context is redacted before anything else sees it. A failed
    /// enqueue (worker backlogged or stopped) is counted and the entry
    /// dropped; the caller is never blocked or failed.
    pub fn log(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        context: Option<Value>,
        error: Option<ErrorDetail>,
    ) {
        let mut entry = LogEntry::new(level, category, message);
        entry.context = context;
        entry.error = error;
        self.dispatch(entry);
    }

    /// Logs an operation duration, selecting the level from how long it
    /// took (>10s error, >5s warn, >1s info, else debug).
    pub fn log_performance(&self, operation: &str, duration: Duration, context: Option<Value>) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let level = if duration_ms > 10_000.0 {
            LogLevel::Error
        } else if duration_ms > 5_000.0 {
            LogLevel::Warn
        } else if duration_ms > 1_000.0 {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };

        let mut context = ensure_object(context);
        insert(&mut context, "operation", Value::String(operation.to_string()));

        let entry = LogEntry::new(level, LogCategory::System, format!("{} completed", operation))
            .with_context(context)
            .with_duration_ms(duration_ms);
        self.dispatch(entry);
    }

    /// Logs an outbound API call, selecting the level from the status code
    /// (>=500 error, >=400 warn, >=300 info, else debug). Method, URL,
    /// status, and duration always land in the context.
    pub fn log_api_call(
        &self,
        method: &str,
        url: &str,
        status: u16,
        duration: Duration,
        context: Option<Value>,
    ) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let level = if status >= 500 {
            LogLevel::Error
        } else if status >= 400 {
            LogLevel::Warn
        } else if status >= 300 {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };

        let mut context = ensure_object(context);
        insert(&mut context, "method", Value::String(method.to_string()));
        insert(&mut context, "url", Value::String(url.to_string()));
        insert(&mut context, "status", Value::from(status));
        insert(&mut context, "duration_ms", Value::from(duration_ms));

        let entry = LogEntry::new(level, LogCategory::Api, format!("{} {}", method, url))
            .with_context(context)
            .with_duration_ms(duration_ms);
        self.dispatch(entry);
    }

    /// Logs a user action, masking any wallet address down to its first 6
    /// and last 4 characters.
    pub fn log_user_action(
        &self,
        action: &str,
        wallet_address: Option<&str>,
        context: Option<Value>,
    ) {
        let mut context = ensure_object(context);
        if let Some(address) = wallet_address {
            insert(
                &mut context,
                "wallet_address",
                Value::String(mask_address(address)),
            );
        }

        let entry = LogEntry::new(LogLevel::Info, LogCategory::UserAction, action)
            .with_context(context);
        self.dispatch(entry);
    }

    /// Current counters for the dashboard consumer.
    pub fn log_stats(&self) -> LogStatsSnapshot {
        self.stats.snapshot()
    }

    /// Asks the worker to flush whatever is buffered.
    pub async fn flush(&self) {
        let _ = self.tx.send(WorkerMessage::Flush).await;
    }

    /// Stops the periodic flush worker after one final best-effort flush of
    /// everything still queued.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WorkerMessage::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let handle = self.worker.lock().expect("logger worker mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn dispatch(&self, mut entry: LogEntry) {
        entry.context = entry.context.take().map(redact_context);
        if entry.request_id.is_none() {
            entry.request_id = entry.context.as_ref().and_then(extract_request_id);
        }

        if !self.should_emit(entry.level) {
            self.stats.record_sampled_out();
            get_metrics().record_log_sampled_out(entry.level.as_str());
            return;
        }

        self.emit_local(&entry);
        self.stats.record_emitted();
        get_metrics().record_log_emitted(entry.level.as_str(), entry.category.as_str());

        if self.tx.try_send(WorkerMessage::Entry(Box::new(entry))).is_err() {
            self.stats.record_dropped();
            get_metrics().record_log_dropped("queue_full");
        }
    }

    fn sample_rate(&self, level: LogLevel) -> f64 {
        if level.always_emitted() {
            return 1.0;
        }
        self.settings
            .sample_rate
            .unwrap_or_else(|| level.default_sample_rate())
    }

    fn should_emit(&self, level: LogLevel) -> bool {
        let rate = self.sample_rate(level);
        rate >= 1.0 || rand::thread_rng().gen::<f64>() < rate
    }

    fn emit_local(&self, entry: &LogEntry) {
        let category = entry.category.as_str();
        let request_id = entry.request_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Error => {
                tracing::error!(category, request_id, "{}", entry.message)
            }
            LogLevel::Warn => {
                tracing::warn!(category, request_id, "{}", entry.message)
            }
            LogLevel::Info => {
                tracing::info!(category, request_id, "{}", entry.message)
            }
            LogLevel::Debug => {
                tracing::debug!(category, request_id, "{}", entry.message)
            }
        }
    }
}

fn ensure_object(context: Option<Value>) -> Value {
    match context {
        Some(value @ Value::Object(_)) => value,
        Some(other) => serde_json::json!({ "value": other }),
        None => Value::Object(serde_json::Map::new()),
    }
}

fn insert(context: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = context {
        map.insert(key.to_string(), value);
    }
}

fn extract_request_id(context: &Value) -> Option<String> {
    let map = context.as_object()?;
    map.get("request_id")
        .or_else(|| map.get("requestId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_logger(settings: LoggerSettings) -> Logger {
        Logger::new(settings, None, None)
    }

    #[tokio::test]
    async fn test_error_and_warn_never_sampled_out() {
        let logger = test_logger(LoggerSettings {
            sample_rate: Some(0.0),
            ..LoggerSettings::default()
        });

        for _ in 0..1_000 {
            logger.log(LogLevel::Error, LogCategory::System, "boom", None, None);
            logger.log(LogLevel::Warn, LogCategory::System, "careful", None, None);
        }

        let stats = logger.log_stats();
        assert_eq!(stats.emitted, 2_000);
        assert_eq!(stats.sampled_out, 0);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_debug_sampling_near_one_percent() {
        let logger = test_logger(LoggerSettings::default());

        for _ in 0..10_000 {
            logger.log(LogLevel::Debug, LogCategory::System, "noise", None, None);
        }

        let stats = logger.log_stats();
        // 1% of 10k is 100; allow generous statistical tolerance.
        assert!(stats.emitted >= 40, "emitted {}", stats.emitted);
        assert!(stats.emitted <= 250, "emitted {}", stats.emitted);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_sample_rate_override_applies_to_info() {
        let logger = test_logger(LoggerSettings {
            sample_rate: Some(1.0),
            ..LoggerSettings::default()
        });

        for _ in 0..100 {
            logger.log(LogLevel::Info, LogCategory::Api, "hello", None, None);
        }

        assert_eq!(logger.log_stats().emitted, 100);
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_context_is_redacted_before_dispatch() {
        let logger = test_logger(LoggerSettings::default());
        logger.log(
            LogLevel::Error,
            LogCategory::Auth,
            "login failed",
            Some(json!({"password": "hunter2"})),
            None,
        );
        // The redaction happens synchronously inside log(); verified in
        // depth by the redaction module and the integration tests.
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_id_extracted_from_context() {
        let entry_context = json!({"requestId": "req-42"});
        assert_eq!(
            extract_request_id(&entry_context).as_deref(),
            Some("req-42")
        );
    }

    #[test]
    fn test_ensure_object_wraps_non_objects() {
        let wrapped = ensure_object(Some(json!([1, 2])));
        assert!(wrapped.is_object());
        assert_eq!(wrapped["value"], json!([1, 2]));
    }
}
