use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::LoggerSettings;
use crate::logger::redaction::safe_serialize;
use crate::logger::sink::LogSink;
use crate::logger::LogStats;
use crate::metrics::{get_metrics, LatencyTimer};
use crate::models::LogEntry;
use crate::store::SharedStore;

/// Store key for the dashboard-facing recent-logs list.
pub(crate) const RECENT_LOGS_KEY: &str = "logs:recent";

/// Sleep horizon while the buffer is empty and no deadline is pending.
const IDLE_SLEEP: Duration = Duration::from_secs(3_600);

pub(crate) enum WorkerMessage {
    Entry(Box<LogEntry>),
    Flush,
    Shutdown(oneshot::Sender<()>),
}

/// Background worker owning all suspension points of the logger: the
/// recent-list persistence and batch delivery to the aggregation sink.
/// Call sites only ever touch the channel.
pub(crate) struct FlushWorker {
    settings: LoggerSettings,
    store: Option<Arc<dyn SharedStore>>,
    sink: Option<Arc<dyn LogSink>>,
    stats: Arc<LogStats>,
    buffer: Vec<LogEntry>,
    first_enqueued_at: Option<Instant>,
}

impl FlushWorker {
    pub(crate) fn spawn(
        rx: mpsc::Receiver<WorkerMessage>,
        settings: LoggerSettings,
        store: Option<Arc<dyn SharedStore>>,
        sink: Option<Arc<dyn LogSink>>,
        stats: Arc<LogStats>,
    ) -> JoinHandle<()> {
        let worker = Self {
            settings,
            store,
            sink,
            stats,
            buffer: Vec::new(),
            first_enqueued_at: None,
        };
        tokio::spawn(worker.run(rx))
    }

    async fn run(mut self, mut rx: mpsc::Receiver<WorkerMessage>) {
        let flush_interval = Duration::from_millis(self.settings.flush_interval_ms);
        let mut interval = tokio::time::interval(flush_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self
                .first_enqueued_at
                .map(|at| at + flush_interval)
                .unwrap_or_else(|| Instant::now() + IDLE_SLEEP);

            tokio::select! {
                message = rx.recv() => match message {
                    Some(WorkerMessage::Entry(entry)) => self.handle_entry(*entry).await,
                    Some(WorkerMessage::Flush) => self.flush().await,
                    Some(WorkerMessage::Shutdown(ack)) => {
                        self.drain(&mut rx).await;
                        self.flush().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.flush().await;
                        return;
                    }
                },
                _ = interval.tick() => self.flush().await,
                _ = tokio::time::sleep_until(deadline) => self.flush().await,
            }
        }
    }

    /// Consumes everything already queued before the final flush.
    async fn drain(&mut self, rx: &mut mpsc::Receiver<WorkerMessage>) {
        while let Ok(message) = rx.try_recv() {
            match message {
                WorkerMessage::Entry(entry) => self.handle_entry(*entry).await,
                WorkerMessage::Flush => self.flush().await,
                WorkerMessage::Shutdown(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn handle_entry(&mut self, entry: LogEntry) {
        if let Some(store) = &self.store {
            let json = safe_serialize(&entry, self.settings.max_entry_chars);
            if let Err(e) = store
                .list_push_trim(
                    RECENT_LOGS_KEY,
                    &json,
                    self.settings.recent_capacity,
                    self.settings.recent_ttl_secs,
                )
                .await
            {
                self.stats.record_store_error();
                warn!("Failed to persist log entry to recent view: {}", e);
            }
        }

        if self.first_enqueued_at.is_none() {
            self.first_enqueued_at = Some(Instant::now());
        }
        self.buffer.push(entry);

        if self.buffer.len() >= self.settings.batch_size {
            self.flush().await;
        }
    }

    /// Delivers the pending batch to the sink. A failed batch is counted
    /// and dropped; requeueing would grow without bound during a sink
    /// outage.
    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        self.first_enqueued_at = None;

        let Some(sink) = &self.sink else {
            self.stats.record_batch_flushed(batch.len() as u64);
            return;
        };

        let timer = LatencyTimer::new();
        match sink.deliver(&batch).await {
            Ok(()) => {
                get_metrics().record_batch_flushed(batch.len() as u64, timer.elapsed_ms());
                self.stats.record_batch_flushed(batch.len() as u64);
                debug!(entries = batch.len(), sink = sink.name(), "Flushed log batch");
            }
            Err(e) => {
                get_metrics().record_flush_failure();
                self.stats.record_flush_failure(batch.len() as u64);
                warn!(
                    entries = batch.len(),
                    sink = sink.name(),
                    "Dropping log batch after failed delivery: {}",
                    e
                );
            }
        }
    }
}
