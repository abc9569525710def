use thiserror::Error;

/// Patterns (lowercase) that indicate credential material in a message.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "rest_api_key",
    "bearer ",
    "authorization:",
    "access_token",
    "client_secret",
];

/// Longest response body (in chars) carried in a page failure report.
const MAX_REPORTED_BODY_CHARS: usize = 2_048;

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for logging.
/// If sensitive content is detected, returns the fallback instead.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Prepares an error response body for the operator report: redacted when it
/// echoes credentials, truncated when very long.
pub(crate) fn report_body(body: &str) -> String {
    let body = sanitize_message(body, "[response body withheld: contains credentials]");
    if body.chars().count() <= MAX_REPORTED_BODY_CHARS {
        return body;
    }
    let mut truncated: String = body.chars().take(MAX_REPORTED_BODY_CHARS).collect();
    truncated.push_str("…[truncated]");
    truncated
}

/// Application-wide fatal error type.
///
/// Page-level problems are not fatal and are reported through [`PageFailure`]
/// instead; everything here aborts the run for the affected entity.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    // ── Output ────────────────────────────────────────────────────────────────
    #[error("Failed to serialize record: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Why pagination stopped before the source ran out of pages.
///
/// Every variant is recovered the same way: the records accumulated so far are
/// kept and handed on to the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageFailure {
    /// The source answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request could not be completed.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// A success response whose body is not a page.
    #[error("Malformed page: {0}")]
    MalformedPage(String),

    /// The advertised next cursor does not resolve to a fetchable page.
    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    /// The source pointed back at a page already fetched in this run.
    #[error("Cursor revisits an earlier page: {0}")]
    CursorCycle(String),

    /// The configured page ceiling was reached with more pages advertised.
    #[error("Page limit of {0} reached")]
    PageLimit(u32),
}

impl PageFailure {
    /// Status code to surface in the operator report, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PageFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
