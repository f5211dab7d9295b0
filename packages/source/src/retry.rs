//! HTTP retry helpers for transient errors.
//!
//! Every request to the violations API goes through [`send_json`] instead
//! of calling `reqwest::RequestBuilder::send()` directly, so transient
//! failures (timeouts, connection resets, server errors, rate limiting,
//! truncated bodies) are retried with bounded exponential backoff.
//!
//! ```ignore
//! let policy = RetryPolicy::default();
//! let body = retry::send_json(&policy, || client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Bounded exponential backoff settings.
///
/// With the defaults (5 retries, 2s base) the waits are 2s, 4s, 8s, 16s,
/// 32s: 62 seconds in total before the run gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Total number of attempts, including the first one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// Connection errors, timeouts, HTTP 429, HTTP 5xx and bodies that fail
/// to read or parse are retried. HTTP 4xx other than 429 is permanent.
///
/// # Errors
///
/// Returns [`SourceError::Status`] for a permanent status, or
/// [`SourceError::RetriesExhausted`] once every attempt failed.
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut last_error = String::new();

    for attempt in 0..policy.attempts() {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            log::warn!(
                "  retry {attempt}/{} in {delay:?}... ({last_error})",
                policy.max_retries
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                log::warn!("  transient error: {e}");
                last_error = e.to_string();
                continue;
            }
            Err(e) => return Err(SourceError::Http(e)),
        };

        let status = response.status();
        let url = response.url().to_string();

        if is_retryable_status(status) {
            log::warn!("  HTTP {status} from {url}");
            last_error = format!("HTTP {status}");
            continue;
        }
        if !status.is_success() {
            return Err(SourceError::Status { status, url });
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("  response body read failed: {e}\n  url: {url}");
                last_error = format!("body read failed: {e}");
                continue;
            }
        };

        match serde_json::from_str(&text) {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!(
                    "  JSON parse failed: {e}\n  url: {url}\n  received: {} bytes\n  body preview: {}",
                    text.len(),
                    preview(&text),
                );
                last_error = format!("JSON parse failed: {e}");
            }
        }
    }

    log::error!(
        "Giving up after {} attempts: {last_error}",
        policy.attempts()
    );
    Err(SourceError::RetriesExhausted {
        attempts: policy.attempts(),
        message: last_error,
    })
}

/// Returns `true` for statuses worth retrying: 429 and every 5xx.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(32));
        assert_eq!(policy.attempts(), 6);
    }

    #[test]
    fn backoff_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 100,
            base_delay: Duration::from_millis(1),
        };
        assert_eq!(policy.backoff(100), Duration::from_millis(1 << 16));
    }

    #[test]
    fn classifies_statuses() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(reqwest::StatusCode::FORBIDDEN));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "é".repeat(400);
        let p = preview(&text);
        assert!(p.len() <= BODY_PREVIEW_LEN);
        assert!(p.chars().all(|c| c == 'é'));
    }
}
