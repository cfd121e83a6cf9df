use thiserror::Error;

/// Errors from LLM provider calls.
///
/// Transport-level conditions (`Network`, `Timeout`, `RateLimited`) are kept
/// distinct from content-level ones (`InvalidResponse`) so callers can tell a
/// dead connection from a provider that answered garbage.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The provider kept rate-limiting after the adapter's own retries.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider returned an error response.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// This backend does not implement streaming.
    #[error("streaming not supported by this backend")]
    StreamUnsupported,
}
