use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::config::AlertSettings;
use crate::error::Result;
use crate::logger::{safe_serialize, Logger};
use crate::metrics::get_metrics;
use crate::models::{Alert, AlertLevel, LogCategory, LogLevel};
use crate::store::SharedStore;

pub mod channel;
pub mod rate_limit;

pub use channel::{escape_markup, AlertChannel, ChatChannel, Delivery, EmailChannel, WebhookChannel};
pub use rate_limit::RecipientRateLimiter;

/// Store key for the dashboard-facing alert history mirror.
const RECENT_ALERTS_KEY: &str = "alerts:recent";

/// Final status of one channel within a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Delivered,
    Failed,
    RateLimited,
}

/// Per-channel result carried back in the dispatch summary.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelResult {
    pub channel: &'static str,
    pub status: ChannelStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What happened to one alert across all configured channels. Returned,
/// never thrown: a dispatch cannot fail the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub alert: Alert,
    pub results: Vec<ChannelResult>,
}

impl DispatchSummary {
    pub fn delivered_anywhere(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == ChannelStatus::Delivered)
    }
}

/// Counters exposed to the monitoring snapshot consumer.
#[derive(Debug, Default)]
pub struct AlertStats {
    total: AtomicU64,
    critical: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
}

impl AlertStats {
    fn record_alert(&self, level: AlertLevel) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if level == AlertLevel::Critical {
            self.critical.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_outcome(&self, status: ChannelStatus) {
        let counter = match status {
            ChannelStatus::Delivered => &self.delivered,
            ChannelStatus::Failed => &self.failed,
            ChannelStatus::RateLimited => &self.rate_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AlertStatsSnapshot {
        AlertStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            critical: self.critical.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`AlertStats`].
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatsSnapshot {
    pub total: u64,
    pub critical: u64,
    pub delivered: u64,
    pub failed: u64,
    pub rate_limited: u64,
}

/// Fans alerts out to configured channels with retry and isolation:
/// one channel failing never stops the others and never raises back to
/// the caller of `send_alert`.
pub struct AlertDispatcher {
    settings: AlertSettings,
    channels: Vec<Arc<dyn AlertChannel>>,
    logger: Option<Arc<Logger>>,
    store: Option<Arc<dyn SharedStore>>,
    history: Mutex<VecDeque<Alert>>,
    stats: AlertStats,
}

impl AlertDispatcher {
    pub fn new(
        settings: AlertSettings,
        channels: Vec<Arc<dyn AlertChannel>>,
        logger: Option<Arc<Logger>>,
        store: Option<Arc<dyn SharedStore>>,
    ) -> Self {
        Self {
            settings,
            channels,
            logger,
            store,
            history: Mutex::new(VecDeque::new()),
            stats: AlertStats::default(),
        }
    }

    /// Builds the channel set from configuration: webhook and chat when
    /// their URLs are present, email when the mail API and at least one
    /// valid recipient are configured.
    pub fn from_settings(
        settings: AlertSettings,
        logger: Option<Arc<Logger>>,
        store: Option<Arc<dyn SharedStore>>,
    ) -> Result<Self> {
        let timeout = Duration::from_millis(settings.delivery_timeout_ms);
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();

        if let Some(url) = &settings.webhook_url {
            channels.push(Arc::new(WebhookChannel::new(url.clone(), timeout)?));
        }
        if let Some(url) = &settings.chat_webhook_url {
            channels.push(Arc::new(ChatChannel::new(url.clone(), timeout)?));
        }
        if let Some(email) = EmailChannel::new(&settings.email, timeout)? {
            channels.push(Arc::new(email));
        }

        Ok(Self::new(settings, channels, logger, store))
    }

    /// Dispatches one alert to every configured channel and returns the
    /// per-channel outcomes. Never returns an error.
    pub async fn send_alert(
        &self,
        level: AlertLevel,
        message: impl Into<String>,
        source: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> DispatchSummary {
        let mut alert = Alert::new(level, message, source);
        if let Some(metadata) = metadata {
            alert = alert.with_metadata(metadata);
        }

        self.stats.record_alert(level);
        self.audit(&alert);
        self.remember(alert.clone()).await;

        let deliveries = self
            .channels
            .iter()
            .map(|channel| self.deliver_with_retry(channel.as_ref(), &alert));
        let results = futures::future::join_all(deliveries).await;

        for result in &results {
            self.stats.record_outcome(result.status);
            get_metrics().record_alert_delivery(
                result.channel,
                match result.status {
                    ChannelStatus::Delivered => "delivered",
                    ChannelStatus::Failed => "failed",
                    ChannelStatus::RateLimited => "rate_limited",
                },
            );
        }

        DispatchSummary { alert, results }
    }

    /// Most recent alerts, newest first, from the in-memory ring.
    pub fn recent_alerts(&self, count: usize) -> Vec<Alert> {
        let history = self.history.lock().expect("alert history mutex poisoned");
        history.iter().take(count).cloned().collect()
    }

    /// Recent alerts from the store mirror; survives a process restart.
    /// Undecodable records are skipped.
    pub async fn stored_recent_alerts(&self, count: usize) -> Vec<Alert> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        if count == 0 {
            return Vec::new();
        }

        match store
            .list_range(RECENT_ALERTS_KEY, 0, count as isize - 1)
            .await
        {
            Ok(items) => items
                .iter()
                .filter_map(|raw| match serde_json::from_str::<Alert>(raw) {
                    Ok(alert) => Some(alert),
                    Err(e) => {
                        warn!("Skipping undecodable stored alert: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Failed to read stored alert history: {}", e);
                Vec::new()
            }
        }
    }

    pub fn alert_stats(&self) -> AlertStatsSnapshot {
        self.stats.snapshot()
    }

    /// Audit trail: every alert also flows through the structured logger.
    fn audit(&self, alert: &Alert) {
        let Some(logger) = &self.logger else {
            return;
        };
        let level = match alert.level {
            AlertLevel::Info => LogLevel::Info,
            AlertLevel::Warning => LogLevel::Warn,
            AlertLevel::Error | AlertLevel::Critical => LogLevel::Error,
        };
        logger.log(
            level,
            LogCategory::System,
            format!("Alert: {}", alert.message),
            Some(json!({
                "alert_id": alert.id.to_string(),
                "alert_level": alert.level.as_str(),
                "source": alert.source,
            })),
            None,
        );
    }

    async fn remember(&self, alert: Alert) {
        {
            let mut history = self.history.lock().expect("alert history mutex poisoned");
            history.push_front(alert.clone());
            history.truncate(self.settings.history_capacity);
        }

        if let Some(store) = &self.store {
            let json = safe_serialize(&alert, 10_000);
            if let Err(e) = store
                .list_push_trim(
                    RECENT_ALERTS_KEY,
                    &json,
                    self.settings.history_capacity,
                    self.settings.history_ttl_secs,
                )
                .await
            {
                warn!("Failed to mirror alert to store history: {}", e);
            }
        }
    }

    async fn deliver_with_retry(&self, channel: &dyn AlertChannel, alert: &Alert) -> ChannelResult {
        let timeout = Duration::from_millis(self.settings.delivery_timeout_ms);
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_detail = None;
        let mut attempts_made = 0;

        for attempt in 1..=max_attempts {
            attempts_made = attempt;
            if attempt > 1 {
                get_metrics().record_alert_retry(channel.name());
                tokio::time::sleep(self.backoff(attempt - 1)).await;
            }

            match tokio::time::timeout(timeout, channel.deliver(alert)).await {
                Ok(Ok(delivery)) => {
                    if delivery.delivered == 0 && !delivery.rate_limited.is_empty() {
                        return ChannelResult {
                            channel: channel.name(),
                            status: ChannelStatus::RateLimited,
                            attempts: attempt,
                            detail: Some(format!(
                                "all {} recipients rate limited",
                                delivery.rate_limited.len()
                            )),
                        };
                    }
                    let detail = (!delivery.rate_limited.is_empty()).then(|| {
                        format!("{} recipients rate limited", delivery.rate_limited.len())
                    });
                    return ChannelResult {
                        channel: channel.name(),
                        status: ChannelStatus::Delivered,
                        attempts: attempt,
                        detail,
                    };
                }
                Ok(Err(e)) => {
                    warn!(
                        channel = channel.name(),
                        attempt,
                        "Alert delivery failed: {}",
                        e
                    );
                    let retriable = e.is_transient();
                    last_detail = Some(e.to_string());
                    if !retriable {
                        break;
                    }
                }
                Err(_) => {
                    warn!(channel = channel.name(), attempt, "Alert delivery timed out");
                    last_detail = Some("delivery timed out".to_string());
                }
            }
        }

        ChannelResult {
            channel: channel.name(),
            status: ChannelStatus::Failed,
            attempts: attempts_made,
            detail: last_detail,
        }
    }

    /// Exponential backoff with a cap and up to 10% jitter.
    fn backoff(&self, retry: u32) -> Duration {
        let exponential = 2u64.saturating_pow(retry.saturating_sub(1));
        let delay_ms = self
            .settings
            .base_delay_ms
            .saturating_mul(exponential)
            .min(self.settings.max_delay_ms);

        let jitter_range = delay_ms / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct FixedChannel {
        name: &'static str,
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AlertChannel for FixedChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn deliver(&self, _alert: &Alert) -> Result<Delivery> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(crate::error::AppError::Timeout("simulated".to_string()))
            } else {
                Ok(Delivery::sent(1))
            }
        }
    }

    fn fast_settings() -> AlertSettings {
        AlertSettings {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            delivery_timeout_ms: 1_000,
            ..AlertSettings::default()
        }
    }

    #[tokio::test]
    async fn test_channel_failure_is_isolated() {
        let dispatcher = AlertDispatcher::new(
            fast_settings(),
            vec![
                Arc::new(FixedChannel {
                    name: "webhook",
                    fail_first: u32::MAX,
                    calls: AtomicU32::new(0),
                }),
                Arc::new(FixedChannel {
                    name: "email",
                    fail_first: 0,
                    calls: AtomicU32::new(0),
                }),
            ],
            None,
            None,
        );

        let summary = dispatcher
            .send_alert(AlertLevel::Critical, "DB down", "healthcheck", None)
            .await;

        assert_eq!(summary.results.len(), 2);
        let webhook = summary.results.iter().find(|r| r.channel == "webhook").unwrap();
        let email = summary.results.iter().find(|r| r.channel == "email").unwrap();
        assert_eq!(webhook.status, ChannelStatus::Failed);
        assert_eq!(email.status, ChannelStatus::Delivered);
        assert!(summary.delivered_anywhere());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dispatcher = AlertDispatcher::new(
            fast_settings(),
            vec![Arc::new(FixedChannel {
                name: "webhook",
                fail_first: 2,
                calls: AtomicU32::new(0),
            })],
            None,
            None,
        );

        let summary = dispatcher
            .send_alert(AlertLevel::Error, "flaky", "test", None)
            .await;

        assert_eq!(summary.results[0].status, ChannelStatus::Delivered);
        assert_eq!(summary.results[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let settings = AlertSettings {
            history_capacity: 3,
            ..fast_settings()
        };
        let dispatcher = AlertDispatcher::new(settings, vec![], None, None);

        for i in 0..5 {
            dispatcher
                .send_alert(AlertLevel::Info, format!("alert {}", i), "test", None)
                .await;
        }

        let recent = dispatcher.recent_alerts(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "alert 4");
        assert_eq!(recent[2].message, "alert 2");
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let dispatcher = AlertDispatcher::new(fast_settings(), vec![], None, None);
        dispatcher
            .send_alert(AlertLevel::Critical, "one", "test", None)
            .await;
        dispatcher
            .send_alert(AlertLevel::Info, "two", "test", None)
            .await;

        let stats = dispatcher.alert_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.critical, 1);
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let dispatcher = AlertDispatcher::new(
            AlertSettings {
                base_delay_ms: 100,
                max_delay_ms: 1_000,
                ..AlertSettings::default()
            },
            vec![],
            None,
            None,
        );

        assert!(dispatcher.backoff(1).as_millis() >= 100);
        assert!(dispatcher.backoff(2).as_millis() >= 200);
        let capped = dispatcher.backoff(10);
        assert!(capped.as_millis() >= 1_000);
        assert!(capped.as_millis() <= 1_100);
    }
}
