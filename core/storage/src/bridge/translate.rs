//! Worker failure text to user-facing categories.

use stowage_common::Error;

/// Recognized failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Server rejected the credentials.
    Authentication,
    /// Nothing listening on the port.
    ConnectionRefused,
    /// Hostname did not resolve.
    HostNotFound,
    /// Network timeout inside the worker.
    TimedOut,
    /// Remote path does not exist.
    Missing,
    /// Anything else.
    Unrecognized,
}

const AUTHENTICATION_PATTERNS: &[&str] = &[
    "all configured authentication methods failed",
    "authentication failed",
    "auth fail",
    "permission denied (publickey",
    "invalid username or password",
];
const REFUSED_PATTERNS: &[&str] = &["econnrefused", "connection refused"];
const HOST_PATTERNS: &[&str] = &[
    "enotfound",
    "getaddrinfo",
    "name or service not known",
    "could not resolve",
    "no such host",
];
const TIMEOUT_PATTERNS: &[&str] = &["etimedout", "timed out", "timeout"];
const MISSING_PATTERNS: &[&str] = &["no such file", "enoent", "does not exist"];

/// Classify raw worker failure text.
pub fn classify_worker_error(raw: &str) -> FailureCategory {
    let lowered = raw.to_ascii_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lowered.contains(p));

    if matches(AUTHENTICATION_PATTERNS) {
        FailureCategory::Authentication
    } else if matches(REFUSED_PATTERNS) {
        FailureCategory::ConnectionRefused
    } else if matches(HOST_PATTERNS) {
        FailureCategory::HostNotFound
    } else if matches(TIMEOUT_PATTERNS) {
        FailureCategory::TimedOut
    } else if matches(MISSING_PATTERNS) {
        FailureCategory::Missing
    } else {
        FailureCategory::Unrecognized
    }
}

/// Translate raw worker failure text; missing-path and unrecognized text
/// pass through unchanged.
pub fn translate_worker_error(raw: &str) -> String {
    match classify_worker_error(raw) {
        FailureCategory::Authentication => {
            "Authentication failed: check the username and credentials".to_string()
        }
        FailureCategory::ConnectionRefused => {
            "Connection refused: the server is not accepting connections on this port".to_string()
        }
        FailureCategory::HostNotFound => "Host not found: check the hostname".to_string(),
        FailureCategory::TimedOut => "Connection timed out: the server did not respond".to_string(),
        FailureCategory::Missing | FailureCategory::Unrecognized => raw.to_string(),
    }
}

/// Build the error for a worker-reported failure.
pub(crate) fn worker_failure(raw: &str) -> Error {
    let message = translate_worker_error(raw);
    match classify_worker_error(raw) {
        FailureCategory::Authentication => Error::Authentication(message),
        FailureCategory::ConnectionRefused
        | FailureCategory::HostNotFound
        | FailureCategory::TimedOut => Error::Network(message),
        FailureCategory::Missing => Error::NotFound(message),
        FailureCategory::Unrecognized => Error::Backend(message),
    }
}
