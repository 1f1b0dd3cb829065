use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::alerts::rate_limit::RecipientRateLimiter;
use crate::config::EmailSettings;
use crate::error::{AppError, Result};
use crate::models::Alert;

/// Outcome of one channel delivery attempt. `delivered` counts recipients
/// reached (1 for single-endpoint channels); `rate_limited` lists the
/// recipients excluded by the per-recipient cap.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub delivered: u32,
    pub rate_limited: Vec<String>,
}

impl Delivery {
    pub fn sent(delivered: u32) -> Self {
        Self {
            delivered,
            rate_limited: Vec::new(),
        }
    }
}

/// A delivery transport. Implementations expose exactly one capability:
/// attempt delivery of a rendered alert, reporting success or failure.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, alert: &Alert) -> Result<Delivery>;
}

/// Escapes characters that are structurally significant in markup-bearing
/// payloads, so alert text cannot inject formatting or entities.
pub fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Generic JSON webhook channel.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<Delivery> {
        let response = self.client.post(&self.url).json(alert).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Validation(format!(
                "webhook returned status {}",
                response.status()
            )));
        }

        Ok(Delivery::sent(1))
    }
}

/// Chat channel posting a rendered, escaped message to an incoming-webhook
/// URL.
pub struct ChatChannel {
    client: reqwest::Client,
    webhook_url: String,
}

impl ChatChannel {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    fn render(alert: &Alert) -> String {
        format!(
            "{} *[{}]* {} ({})",
            alert.level.emoji(),
            alert.level.as_str().to_uppercase(),
            escape_markup(&alert.message),
            escape_markup(&alert.source)
        )
    }
}

#[async_trait]
impl AlertChannel for ChatChannel {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn deliver(&self, alert: &Alert) -> Result<Delivery> {
        let payload = json!({ "text": Self::render(alert) });
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Validation(format!(
                "chat webhook returned status {}",
                response.status()
            )));
        }

        Ok(Delivery::sent(1))
    }
}

/// Email channel backed by an HTTP mail API, with per-recipient rate
/// limiting. Structurally invalid recipients are dropped at construction.
pub struct EmailChannel {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
    recipients: Vec<String>,
    limiter: RecipientRateLimiter,
}

impl EmailChannel {
    pub fn new(settings: &EmailSettings, timeout: Duration) -> Result<Option<Self>> {
        let Some(api_url) = settings.api_url.clone() else {
            return Ok(None);
        };

        let recipients: Vec<String> = settings
            .recipients
            .iter()
            .filter(|address| {
                let valid = validator::validate_email(address.as_str());
                if !valid {
                    warn!(recipient = %address, "Dropping invalid alert recipient");
                }
                valid
            })
            .cloned()
            .collect();

        if recipients.is_empty() {
            warn!("Email channel configured without any valid recipients");
            return Ok(None);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Some(Self {
            client,
            api_url,
            api_key: settings.api_key.clone(),
            from: settings.from.clone(),
            recipients,
            limiter: RecipientRateLimiter::new(
                settings.max_per_hour,
                Duration::from_secs(3_600),
            ),
        }))
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, alert: &Alert) -> Result<Delivery> {
        let mut eligible = Vec::new();
        let mut rate_limited = Vec::new();
        for recipient in &self.recipients {
            if self.limiter.try_acquire(recipient) {
                eligible.push(recipient.clone());
            } else {
                rate_limited.push(recipient.clone());
            }
        }

        if eligible.is_empty() {
            return Ok(Delivery {
                delivered: 0,
                rate_limited,
            });
        }

        let subject = format!("[{}] {}", alert.level.as_str().to_uppercase(), alert.source);
        let payload = json!({
            "from": self.from,
            "to": eligible,
            "subject": subject,
            "text": alert.message,
        });

        let mut request = self.client.post(&self.api_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::Validation(format!(
                "mail API returned status {}",
                response.status()
            )));
        }

        Ok(Delivery {
            delivered: eligible.len() as u32,
            rate_limited,
        })
    }
}
