use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version stamped on persisted log records.
pub const LOG_SCHEMA_VERSION: u16 = 1;

/// Severity level of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Default sampling rate for this level. Error and Warn are never
    /// sampled out.
    pub fn default_sample_rate(&self) -> f64 {
        match self {
            LogLevel::Error | LogLevel::Warn => 1.0,
            LogLevel::Info => 0.1,
            LogLevel::Debug => 0.01,
        }
    }

    /// Returns true if entries at this level bypass sampling entirely.
    pub fn always_emitted(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Warn)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Domain tag for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Payment,
    Trading,
    Auth,
    Api,
    Blockchain,
    Infrastructure,
    UserAction,
    System,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Payment => "payment",
            LogCategory::Trading => "trading",
            LogCategory::Auth => "auth",
            LogCategory::Api => "api",
            LogCategory::Blockchain => "blockchain",
            LogCategory::Infrastructure => "infrastructure",
            LogCategory::UserAction => "user_action",
            LogCategory::System => "system",
        }
    }
}

/// Captured error detail attached to a log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorDetail {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// A single structured log record. Immutable once created; the context is
/// redacted before construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub schema_version: u16,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl LogEntry {
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            schema_version: LOG_SCHEMA_VERSION,
            timestamp: Utc::now(),
            level,
            category,
            message: message.into(),
            context: None,
            request_id: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(error);
        self
    }
}
