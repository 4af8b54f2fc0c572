//! Quota detection for upstream search-API responses
//!
//! Distinguishes daily-quota exhaustion (which drives key failover) from
//! credential problems and everything else. Only a quota-exceeded
//! classification forces a key's recorded usage to the ceiling.

/// Body phrases that mark a response as daily-quota exhaustion.
///
/// The upstream reports these inside the structured error payload; matching
/// on the body is resilient to the provider using 403 or 429 for the same
/// condition.
const QUOTA_PATTERNS: &[&str] = &["quotaexceeded", "resource_exhausted", "dailylimitexceeded"];

/// Body phrases that mark the credential itself as invalid.
const KEY_INVALID_PATTERNS: &[&str] = &["api_key_invalid", "keyinvalid", "api key not valid"];

/// What an upstream error response means for the credential pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The key's daily allowance is spent; force it to the ceiling and fail
    /// over to the next key.
    QuotaExceeded,
    /// The key is rejected outright; disable it.
    InvalidCredential,
    /// Anything else; propagate without touching the pool.
    Other,
}

/// Classify an upstream error by HTTP status and response body.
pub fn classify_status(status: u16, body: &str) -> UpstreamErrorKind {
    let lower = body.to_lowercase();
    match status {
        403 => {
            if matches_any(&lower, QUOTA_PATTERNS) {
                UpstreamErrorKind::QuotaExceeded
            } else {
                UpstreamErrorKind::InvalidCredential
            }
        }
        429 => {
            if matches_any(&lower, QUOTA_PATTERNS) {
                UpstreamErrorKind::QuotaExceeded
            } else {
                UpstreamErrorKind::Other
            }
        }
        400 => {
            if matches_any(&lower, KEY_INVALID_PATTERNS) {
                UpstreamErrorKind::InvalidCredential
            } else {
                UpstreamErrorKind::Other
            }
        }
        401 => UpstreamErrorKind::InvalidCredential,
        _ => UpstreamErrorKind::Other,
    }
}

fn matches_any(lower: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| lower.contains(p))
}
