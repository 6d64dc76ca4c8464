//! Retry-with-backoff shared by every HTTP provider.
//!
//! 429 and 5xx responses are retried with exponential backoff, honoring a
//! numeric `Retry-After` header when present. Other 4xx statuses fail
//! immediately. Network errors count as retriable.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::LlmError;

const MAX_ATTEMPTS: u32 = 4;
const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 20_000;

fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(10)).min(MAX_DELAY_MS);
    Duration::from_millis(ms)
}

/// Parse the delta-seconds form of `Retry-After`. HTTP-date values fall
/// back to the computed exponential delay.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Issue a request repeatedly until it succeeds, fails non-retriably, or
/// exhausts the attempt budget. `attempt_fn` must build a fresh request on
/// every call so retries are idempotent.
pub async fn send_with_retry<F, Fut>(mut attempt_fn: F) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut last_err: Option<LlmError> = None;

    for attempt in 0..MAX_ATTEMPTS {
        match attempt_fn().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let retriable = status.as_u16() == 429 || status.is_server_error();
                if retriable && attempt + 1 < MAX_ATTEMPTS {
                    let delay = retry_after(&response).unwrap_or_else(|| backoff_delay(attempt));
                    warn!(status = status.as_u16(), ?delay, attempt, "retriable HTTP status, backing off");
                    tokio::time::sleep(delay).await;
                    last_err = Some(LlmError::Http {
                        status: status.as_u16(),
                        body: String::new(),
                    });
                    continue;
                }

                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Http { status: status.as_u16(), body });
            }
            Err(err) => {
                if attempt + 1 < MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    debug!(%err, ?delay, attempt, "transport error, backing off");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err.into());
                    continue;
                }
                return Err(err.into());
            }
        }
    }

    Err(last_err.unwrap_or(LlmError::Malformed("retry loop exited without a result".into())))
}
