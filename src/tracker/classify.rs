use crate::models::{ErrorCategory, Severity};

/// Keyword rules in priority order, most specific first. Categorization is
/// total: the fallthrough is always `Api`.
const PAYMENT_TERMS: &[&str] = &["payment", "charge", "refund", "card", "invoice", "checkout"];
const TRADING_TERMS: &[&str] = &["trade", "trading", "swap", "position", "order", "slippage"];
const AUTH_TERMS: &[&str] = &[
    "auth",
    "unauthorized",
    "forbidden",
    "login",
    "wallet",
    "signature",
    "session",
];
const NETWORK_TERMS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "fetch",
    "connection",
    "unreachable",
    "socket",
    "dns",
    "unavailable",
];
const VALIDATION_TERMS: &[&str] = &["validation", "invalid", "format", "malformed", "missing"];

fn matches_any(message: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| message.contains(term))
}

/// Assigns exactly one category from the message content.
pub fn categorize(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();

    if matches_any(&message, PAYMENT_TERMS) {
        ErrorCategory::Payment
    } else if matches_any(&message, TRADING_TERMS) {
        ErrorCategory::Trading
    } else if matches_any(&message, AUTH_TERMS) {
        ErrorCategory::Auth
    } else if matches_any(&message, NETWORK_TERMS) {
        ErrorCategory::Infrastructure
    } else if matches_any(&message, VALIDATION_TERMS) {
        ErrorCategory::UserError
    } else {
        ErrorCategory::Api
    }
}

pub fn is_validation_message(message: &str) -> bool {
    matches_any(&message.to_lowercase(), VALIDATION_TERMS)
}

pub fn is_network_message(message: &str) -> bool {
    matches_any(&message.to_lowercase(), NETWORK_TERMS)
}

/// Derives severity from the message and its category. Payment and trading
/// failures are critical unless the message is itself a validation
/// complaint; plain validation errors are low; timeouts and network
/// failures are high.
pub fn score_severity(message: &str, category: ErrorCategory) -> Severity {
    match category {
        ErrorCategory::Payment | ErrorCategory::Trading => {
            if is_validation_message(message) {
                Severity::Medium
            } else {
                Severity::Critical
            }
        }
        _ if is_validation_message(message) => Severity::Low,
        _ if is_network_message(message) => Severity::High,
        ErrorCategory::Auth | ErrorCategory::Infrastructure => Severity::High,
        ErrorCategory::Api => Severity::Medium,
        _ => Severity::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_payment() {
        assert_eq!(categorize("Payment declined by processor"), ErrorCategory::Payment);
        assert_eq!(categorize("charge failed"), ErrorCategory::Payment);
    }

    #[test]
    fn test_categorize_trading() {
        assert_eq!(categorize("swap exceeded slippage"), ErrorCategory::Trading);
        assert_eq!(categorize("position not found"), ErrorCategory::Trading);
    }

    #[test]
    fn test_categorize_auth() {
        assert_eq!(categorize("wallet signature rejected"), ErrorCategory::Auth);
        assert_eq!(categorize("Unauthorized"), ErrorCategory::Auth);
    }

    #[test]
    fn test_categorize_infrastructure() {
        assert_eq!(categorize("request timed out"), ErrorCategory::Infrastructure);
        assert_eq!(categorize("network unreachable"), ErrorCategory::Infrastructure);
    }

    #[test]
    fn test_categorize_user_error() {
        assert_eq!(categorize("invalid amount"), ErrorCategory::UserError);
        assert_eq!(categorize("Validation failed for field x"), ErrorCategory::UserError);
    }

    #[test]
    fn test_categorize_default_is_api() {
        assert_eq!(categorize("something unexpected happened"), ErrorCategory::Api);
    }

    #[test]
    fn test_priority_payment_beats_validation() {
        // "invalid payment amount" carries both a payment and a validation
        // term; the more specific payment rule wins.
        assert_eq!(categorize("invalid payment amount"), ErrorCategory::Payment);
    }

    #[test]
    fn test_severity_validation_is_low() {
        assert_eq!(
            score_severity("invalid amount", ErrorCategory::UserError),
            Severity::Low
        );
    }

    #[test]
    fn test_severity_network_is_high() {
        assert_eq!(
            score_severity("connection refused", ErrorCategory::Infrastructure),
            Severity::High
        );
    }

    #[test]
    fn test_severity_payment_is_critical() {
        assert_eq!(
            score_severity("charge failed", ErrorCategory::Payment),
            Severity::Critical
        );
    }

    #[test]
    fn test_severity_payment_validation_is_medium() {
        assert_eq!(
            score_severity("invalid payment amount", ErrorCategory::Payment),
            Severity::Medium
        );
    }

    #[test]
    fn test_severity_api_defaults_to_medium() {
        assert_eq!(
            score_severity("unexpected response shape", ErrorCategory::Api),
            Severity::Medium
        );
    }

    #[test]
    fn test_severity_auth_defaults_to_high() {
        assert_eq!(
            score_severity("session expired", ErrorCategory::Auth),
            Severity::High
        );
    }
}
