//! Error classification
//!
//! Maps raw failure text to an [`ErrorKind`] with an ordered rule table. The
//! first rule with a matching pattern wins, so a message mentioning both a 404
//! and a 429 is classified as `media_404`. Reordering [`RULES`] changes
//! behavior.

use super::record::ErrorKind;

/// Ordered classification rules: (kind, lowercase substrings)
pub const RULES: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::Media404, &["404", "not found"]),
    (ErrorKind::Media403, &["403", "forbidden"]),
    (
        ErrorKind::RateLimit,
        &["429", "too many requests", "rate limit", "rate-limit", "ratelimit"],
    ),
    (
        ErrorKind::AuthError,
        &["401", "unauthorized", "authentication", "login", "logged in", "auth token"],
    ),
    (
        ErrorKind::NetworkError,
        &[
            "enotfound",
            "econnrefused",
            "econnreset",
            "etimedout",
            "dns error",
            "failed to lookup address",
            "connection refused",
            "connection reset",
            "error trying to connect",
            "timed out",
            "timeout",
        ],
    ),
    (ErrorKind::JsonParseError, &["json", "parse"]),
    (
        ErrorKind::MediaDownloadFailed,
        &["download", "failed to get", "failed to fetch"],
    ),
];

/// Classify a failure from its message and any auxiliary output (for example
/// the stderr of a subprocess).
pub fn classify(message: &str, raw_output: Option<&str>) -> ErrorKind {
    let mut haystack = message.to_lowercase();
    if let Some(raw) = raw_output {
        haystack.push('\n');
        haystack.push_str(&raw.to_lowercase());
    }

    RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| matches_pattern(&haystack, p)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::UnknownError)
}

/// Kind implied by an HTTP status alone.
///
/// Gateway failures and request timeouts count as network errors so metadata
/// fetches retry them. Other statuses carry no kind of their own.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::AuthError),
        403 => Some(ErrorKind::Media403),
        404 | 410 => Some(ErrorKind::Media404),
        429 => Some(ErrorKind::RateLimit),
        408 | 502 | 503 | 504 => Some(ErrorKind::NetworkError),
        _ => None,
    }
}

/// Numeric patterns only match as whole tokens, so a status code never
/// matches digits inside an id, a file name or a port.
fn matches_pattern(haystack: &str, pattern: &str) -> bool {
    if !pattern.bytes().all(|b| b.is_ascii_digit()) {
        return haystack.contains(pattern);
    }
    let bytes = haystack.as_bytes();
    haystack.match_indices(pattern).any(|(start, _)| {
        let end = start + pattern.len();
        let before = start.checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(end).copied();
        !before.is_some_and(|b| b.is_ascii_alphanumeric())
            && !after.is_some_and(|b| b.is_ascii_alphanumeric())
    })
}

/// Classify any error by its display text, including its source chain.
pub fn classify_error(error: &(dyn std::error::Error + 'static), raw_output: Option<&str>) -> ErrorKind {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    classify(&message, raw_output)
}
