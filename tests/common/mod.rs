use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use monitoring_pipeline::config::LoggerSettings;
use monitoring_pipeline::error::{AppError, Result};
use monitoring_pipeline::logger::LogSink;
use monitoring_pipeline::models::LogEntry;
use monitoring_pipeline::store::MemoryStore;

#[allow(dead_code)]
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

#[allow(dead_code)]
pub fn fast_logger_settings() -> LoggerSettings {
    LoggerSettings {
        batch_size: 5,
        flush_interval_ms: 50,
        ..LoggerSettings::default()
    }
}

/// Sink capturing every delivered batch, for asserting flush behavior.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<LogEntry>>>,
    fail: Mutex<bool>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn batches(&self) -> Vec<Vec<LogEntry>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn delivered_entries(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, batch: &[LogEntry]) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::Timeout("simulated sink outage".to_string()));
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}
