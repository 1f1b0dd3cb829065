use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::ErrorCategory;

/// Length of the hex fingerprint identifier.
const FINGERPRINT_LEN: usize = 16;

/// Stack frames originating in runtimes and dependency trees carry no
/// call-site information; the first frame outside of them does.
const FRAMEWORK_MARKERS: &[&str] = &[
    "node_modules",
    "internal/",
    "/.cargo/",
    "/rustc/",
    "tokio::",
    "std::",
    "core::",
];

/// Computes the deduplication key for an error occurrence. Two occurrences
/// of the same error at the same call site in the same category always
/// produce the same fingerprint, regardless of variable payloads in the
/// message (amounts, addresses, identifiers).
pub fn fingerprint(
    category: ErrorCategory,
    message: &str,
    stack: Option<&str>,
    endpoint: Option<&str>,
) -> String {
    let input = format!(
        "{}|{}|{}|{}",
        category.as_str(),
        normalize_message(message),
        first_app_frame(stack),
        endpoint.unwrap_or("")
    );

    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Lowercases, collapses whitespace, and replaces variable payloads
/// (numbers, hex addresses, UUIDs) with stable placeholders.
pub fn normalize_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for token in message.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&normalize_token(&token.to_lowercase()));
    }
    out
}

fn normalize_token(token: &str) -> String {
    let trimmed = token.trim_matches(|c: char| ",.;:()[]{}'\"!?".contains(c));

    if !trimmed.is_empty() {
        if trimmed.len() > 4
            && trimmed.starts_with("0x")
            && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit())
        {
            return token.replace(trimmed, "<addr>");
        }
        if trimmed.len() == 36 && Uuid::parse_str(trimmed).is_ok() {
            return token.replace(trimmed, "<uuid>");
        }
    }

    let mut normalized = String::with_capacity(token.len());
    let mut in_digits = false;
    for c in token.chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                normalized.push('#');
                in_digits = true;
            }
        } else {
            normalized.push(c);
            in_digits = false;
        }
    }
    normalized
}

/// Returns the first stack frame that is not a framework or runtime frame,
/// or an empty string when no stack is available.
pub fn first_app_frame(stack: Option<&str>) -> String {
    let Some(stack) = stack else {
        return String::new();
    };

    stack
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        // The first line of most stack captures repeats the message.
        .skip(1)
        .find(|line| !FRAMEWORK_MARKERS.iter().any(|marker| line.contains(marker)))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint(
            ErrorCategory::Payment,
            "charge failed",
            None,
            Some("/deposit"),
        );
        let b = fingerprint(
            ErrorCategory::Payment,
            "charge failed",
            None,
            Some("/deposit"),
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_varies_with_endpoint() {
        let a = fingerprint(ErrorCategory::Api, "boom", None, Some("/deposit"));
        let b = fingerprint(ErrorCategory::Api, "boom", None, Some("/withdraw"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_with_category() {
        let a = fingerprint(ErrorCategory::Api, "boom", None, None);
        let b = fingerprint(ErrorCategory::Auth, "boom", None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_collapses_numbers() {
        assert_eq!(
            normalize_message("retry 3 of 15 failed after 2500ms"),
            "retry # of # failed after #ms"
        );
    }

    #[test]
    fn test_normalize_replaces_addresses() {
        let normalized =
            normalize_message("transfer to 0x742d35Cc6634C0532925a3b844Bc454e4438f44e failed");
        assert_eq!(normalized, "transfer to <addr> failed");
    }

    #[test]
    fn test_normalize_replaces_uuids() {
        let normalized =
            normalize_message("record 550e8400-e29b-41d4-a716-446655440000 missing");
        assert_eq!(normalized, "record <uuid> missing");
    }

    #[test]
    fn test_variable_payloads_collapse_to_one_fingerprint() {
        let a = fingerprint(
            ErrorCategory::UserError,
            "invalid amount 100",
            None,
            Some("/deposit"),
        );
        let b = fingerprint(
            ErrorCategory::UserError,
            "invalid amount 250",
            None,
            Some("/deposit"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_first_app_frame_skips_framework_frames() {
        let stack = "Error: boom\n  at tokio::runtime::park\n  at node_modules/express/lib/router.js:12\n  at app/payments.rs:42\n";
        assert_eq!(first_app_frame(Some(stack)), "at app/payments.rs:42");
    }

    #[test]
    fn test_first_app_frame_without_stack() {
        assert_eq!(first_app_frame(None), "");
    }
}
