pub mod alert;
pub mod error_report;
pub mod log_entry;

pub use alert::{Alert, AlertLevel};
pub use error_report::{
    ErrorCategory, ErrorEntry, ErrorReport, RequestContext, Severity, ERROR_SCHEMA_VERSION,
};
pub use log_entry::{ErrorDetail, LogCategory, LogEntry, LogLevel, LOG_SCHEMA_VERSION};
