use std::time::Duration;

const RETRY_DELAY_CAP_MS: u64 = 30_000;

/// Return true when a GitHub response status is worth retrying.
pub fn is_retryable_github_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Return true for transport failures that are typically transient.
pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Parse a `Retry-After` header expressed in whole seconds.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Exponential backoff for `attempt` (1-based), overridden by `Retry-After` when present.
pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after;
    }
    let exponent = attempt.saturating_sub(1).min(16) as u32;
    let delay_ms = base_delay_ms
        .max(1)
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(RETRY_DELAY_CAP_MS);
    Duration::from_millis(delay_ms)
}

/// Truncate a response body for inclusion in an error message.
pub fn truncate_for_error(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut truncated = trimmed.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
