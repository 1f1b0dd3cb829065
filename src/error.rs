use thiserror::Error;

/// Application-level errors for the monitoring pipeline.
///
/// Nothing in the pipeline propagates these to instrumented call sites;
/// they surface only in internal workers, health probes, and tests.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP delivery error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Returns true if the error is worth retrying (transient delivery
    /// or store failures).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Redis(_) | AppError::Http(_) | AppError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
