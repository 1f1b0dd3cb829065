use std::time::Duration;

use async_trait::async_trait;

use crate::config::LoggerSettings;
use crate::error::{AppError, Result};
use crate::models::LogEntry;

/// External log-aggregation sink. Receives batches of entries; each
/// delivery either succeeds as a whole or fails as a whole.
#[async_trait]
pub trait LogSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, batch: &[LogEntry]) -> Result<()>;
}

/// HTTP sink posting JSON batches to a log-aggregation endpoint.
pub struct HttpLogSink {
    client: reqwest::Client,
    url: String,
}

impl HttpLogSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Builds a sink from logger settings when a sink URL is configured.
    pub fn from_settings(settings: &LoggerSettings) -> Result<Option<Self>> {
        match &settings.sink_url {
            Some(url) => Ok(Some(Self::new(
                url.clone(),
                Duration::from_millis(settings.sink_timeout_ms),
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, batch: &[LogEntry]) -> Result<()> {
        let response = self.client.post(&self.url).json(batch).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Validation(format!(
                "log sink returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_without_url() {
        let settings = LoggerSettings::default();
        assert!(HttpLogSink::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_from_settings_with_url() {
        let settings = LoggerSettings {
            sink_url: Some("http://localhost:9200/logs".to_string()),
            ..LoggerSettings::default()
        };
        let sink = HttpLogSink::from_settings(&settings).unwrap().unwrap();
        assert_eq!(sink.name(), "http");
    }
}
