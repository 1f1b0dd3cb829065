use serde::Deserialize;

/// Top-level settings for the monitoring pipeline.
///
/// Loaded from `config/default.toml`, overlaid by `config/local.toml` and
/// `APP__`-prefixed environment variables. Every section has serde defaults
/// so a partial file (or none, via `Settings::default()`) still yields a
/// runnable configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub logger: LoggerSettings,
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub environment: String,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub enabled: bool,
    pub url: String,
    pub key_prefix: String,
    /// Upper bound for any single store round trip.
    pub op_timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379".to_string(),
            key_prefix: "monitoring".to_string(),
            op_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerSettings {
    /// Overrides the per-level defaults (Info 0.1, Debug 0.01) when set.
    pub sample_rate: Option<f64>,
    pub recent_capacity: usize,
    pub recent_ttl_secs: u64,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    /// Capacity of the channel between call sites and the flush worker.
    pub queue_capacity: usize,
    /// Character limit for a serialized entry before truncation.
    pub max_entry_chars: usize,
    /// HTTP log-aggregation sink; local-only logging when unset.
    pub sink_url: Option<String>,
    pub sink_timeout_ms: u64,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            sample_rate: None,
            recent_capacity: 1_000,
            recent_ttl_secs: 86_400,
            batch_size: 100,
            flush_interval_ms: 5_000,
            queue_capacity: 4_096,
            max_entry_chars: 10_000,
            sink_url: None,
            sink_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerSettings {
    /// Sliding retention window for deduplicated error entries.
    pub retention_secs: u64,
    /// Maximum size of the recency-ordered fingerprint index.
    pub max_recent: usize,
    /// Width of a statistics bucket.
    pub bucket_secs: u64,
    /// TTL applied to statistics buckets.
    pub bucket_ttl_secs: u64,
    #[serde(default)]
    pub rate_limit: TrackerRateLimitSettings,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            retention_secs: 3_600,
            max_recent: 100,
            bucket_secs: 300,
            bucket_ttl_secs: 3_600,
            rate_limit: TrackerRateLimitSettings::default(),
        }
    }
}

/// Per-fingerprint rate limiting, exposed as plain configuration and
/// disabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerRateLimitSettings {
    pub enabled: bool,
    pub threshold: u64,
    pub window_secs: u64,
}

impl Default for TrackerRateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 50,
            window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettings {
    pub webhook_url: Option<String>,
    pub chat_webhook_url: Option<String>,
    #[serde(default)]
    pub email: EmailSettings,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub delivery_timeout_ms: u64,
    pub history_capacity: usize,
    pub history_ttl_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            chat_webhook_url: None,
            email: EmailSettings::default(),
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            delivery_timeout_ms: 10_000,
            history_capacity: 100,
            history_ttl_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub recipients: Vec<String>,
    /// Sliding one-hour cap per recipient.
    pub max_per_hour: u32,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: "alerts@localhost".to_string(),
            recipients: Vec::new(),
            max_per_hour: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    /// Per-check timeout envelope.
    pub check_timeout_ms: u64,
    /// Latency above which a healthy store check is reported degraded.
    pub degraded_latency_ms: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_timeout_ms: 5_000,
            degraded_latency_ms: 50.0,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.logger.recent_capacity, 1_000);
        assert_eq!(settings.logger.batch_size, 100);
        assert_eq!(settings.tracker.bucket_secs, 300);
        assert_eq!(settings.alerts.email.max_per_hour, 10);
        assert!(!settings.tracker.rate_limit.enabled);
    }

    #[test]
    fn test_sample_rate_unset_by_default() {
        let settings = Settings::default();
        assert!(settings.logger.sample_rate.is_none());
    }
}
