use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::log_entry::ErrorDetail;

/// Schema version stamped on persisted error entries.
pub const ERROR_SCHEMA_VERSION: u16 = 1;

/// Severity of a tracked error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Domain category of a tracked error. Categorization is total: every error
/// lands in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Payment,
    Trading,
    Auth,
    Api,
    Infrastructure,
    UserError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Payment => "payment",
            ErrorCategory::Trading => "trading",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Api => "api",
            ErrorCategory::Infrastructure => "infrastructure",
            ErrorCategory::UserError => "user_error",
        }
    }
}

/// Request-scoped context captured alongside an error occurrence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            user_id: None,
            wallet_address: None,
            endpoint: None,
            method: None,
            request_id: None,
            environment: environment.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_wallet_address(mut self, wallet_address: impl Into<String>) -> Self {
        self.wallet_address = Some(wallet_address.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Fully classified error payload, built at the first occurrence of a
/// fingerprint and retained unchanged for later occurrences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: ErrorDetail,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub context: RequestContext,
}

/// Deduplicated error entry stored under its fingerprint. The count and
/// last-seen fields advance on every occurrence within the retention window;
/// the embedded report does not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub schema_version: u16,
    pub fingerprint: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub report: ErrorReport,
}

impl ErrorEntry {
    pub fn new(fingerprint: impl Into<String>, report: ErrorReport) -> Self {
        let now = Utc::now();
        Self {
            schema_version: ERROR_SCHEMA_VERSION,
            fingerprint: fingerprint.into(),
            count: 1,
            first_seen: now,
            last_seen: now,
            report,
        }
    }
}
