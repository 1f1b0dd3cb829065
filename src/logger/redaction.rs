use serde_json::Value;

/// Replacement for values matching a sensitive pattern.
pub const REDACTED: &str = "[REDACTED]";

/// Replacement for values nested past the depth guard.
pub const DEPTH_MARKER: &str = "[deep value truncated]";

/// Marker appended when a serialized entry exceeds the character limit.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

const MAX_DEPTH: usize = 16;

/// Sensitive terms, matched against normalized keys and string values.
/// Normalization strips `_`, `-`, and spaces and lowercases, so `apiKey`,
/// `api_key`, and `API-KEY` all match `apikey`.
const SENSITIVE_TERMS: &[&str] = &[
    "password",
    "passphrase",
    "token",
    "apikey",
    "secret",
    "privatekey",
    "mnemonic",
    "seedphrase",
    "ssn",
    "creditcard",
    "cardnumber",
    "cvv",
    "authorization",
    "cookie",
];

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_sensitive(s: &str) -> bool {
    let normalized = normalize(s);
    SENSITIVE_TERMS.iter().any(|term| normalized.contains(term))
}

fn redact_in_place(value: &mut Value, depth: usize) {
    if depth >= MAX_DEPTH {
        *value = Value::String(DEPTH_MARKER.to_string());
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_sensitive(key) {
                    *nested = Value::String(REDACTED.to_string());
                } else {
                    redact_in_place(nested, depth + 1);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_in_place(item, depth + 1);
            }
        }
        Value::String(s) => {
            if is_sensitive(s) {
                *value = Value::String(REDACTED.to_string());
            }
        }
        _ => {}
    }
}

/// Redacts sensitive keys and string values recursively. Always returns a
/// value; a redaction pass never suppresses the log entry it protects.
pub fn redact_context(mut context: Value) -> Value {
    redact_in_place(&mut context, 0);
    context
}

/// Serializes a value, truncating the output to `max_chars` characters with
/// a marker when the payload is oversized. Serialization failures degrade to
/// a diagnostic string rather than an error.
pub fn safe_serialize<T: serde::Serialize>(value: &T, max_chars: usize) -> String {
    let serialized = match serde_json::to_string(value) {
        Ok(s) => s,
        Err(e) => return format!("{{\"serialization_error\":\"{}\"}}", e),
    };

    if serialized.chars().count() <= max_chars {
        return serialized;
    }

    let truncated: String = serialized.chars().take(max_chars).collect();
    format!("{}{}", truncated, TRUNCATION_MARKER)
}
