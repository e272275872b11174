//! # Error Sanitization
//!
//! Scrubs credentials from error text before it leaves the process, either
//! in a caller-facing error or in a log line.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

// Static regex patterns for sensitive information detection
static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // key=..., api_key: ..., token=...
        (
            r#"(?i)\b(api[_-]?key|access[_-]?token|token|secret|key)\b(["']?\s*[=:]\s*["']?)[^\s"'&,]+"#,
            "${1}${2}[REDACTED]",
        ),
        // OAuth 2.0 bearer tokens
        (r"(?i)\bbearer\s+[a-z0-9._~+/=-]+", "Bearer [REDACTED]"),
        // Google API keys
        (r"AIza[0-9A-Za-z_\-]{35}", REDACTED),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Masks credential-shaped substrings in a message
pub fn sanitize_message(message: &str) -> String {
    SENSITIVE_PATTERNS
        .iter()
        .fold(message.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}

/// Removes every known secret verbatim, then applies [`sanitize_message`]
pub fn redact<S: AsRef<str>>(message: &str, secrets: &[S]) -> String {
    let scrubbed = secrets
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .fold(message.to_string(), |text, secret| text.replace(secret, REDACTED));
    sanitize_message(&scrubbed)
}
