//! LLM provider adapters.
//!
//! Each adapter implements the backend trait against one provider's native
//! wire protocol. Transient transport failures (connection errors, timeouts,
//! rate limiting, server errors) are retried here with bounded exponential
//! backoff; that policy is local to the adapter and independent of any
//! validation-driven retrying done above it.

mod anthropic;
mod openai;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
pub use openai::{OpenAiBackend, OpenAiBackendBuilder};

use crate::model::ModelError;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_TRANSPORT_ATTEMPTS: u32 = 3;

const BACKOFF_BASE_MS: u64 = 250;

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << attempt.saturating_sub(1).min(8))
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request, retrying transient transport failures.
///
/// `request` must produce a fresh builder per attempt. Non-transient HTTP
/// errors are returned as responses for the caller to map; a rate limit that
/// survives every attempt surfaces as [`ModelError::RateLimited`].
pub(crate) async fn send_with_retries<F>(
    mut request: F,
    attempts: u32,
) -> Result<reqwest::Response, ModelError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match request().send().await {
            Ok(response) => {
                let status = response.status();
                if retryable_status(status) && attempt < attempts {
                    warn!(%status, attempt, "transient provider failure, backing off");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ModelError::RateLimited(body));
                }
                return Ok(response);
            }
            Err(e) if (e.is_timeout() || e.is_connect()) && attempt < attempts => {
                warn!(error = %e, attempt, "transport error, backing off");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(e) if e.is_timeout() => return Err(ModelError::Timeout),
            Err(e) => return Err(ModelError::Network(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_millis(250));
        assert_eq!(backoff_delay(2), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_millis(1000));
    }

    #[test]
    fn backoff_is_capped() {
        assert!(backoff_delay(40) <= Duration::from_millis(BACKOFF_BASE_MS << 8));
    }

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!retryable_status(StatusCode::BAD_REQUEST));
        assert!(!retryable_status(StatusCode::UNAUTHORIZED));
    }
}
