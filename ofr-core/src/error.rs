//! Error types shared by every data source

use thiserror::Error;

/// Failure of a single upstream request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// HTTP 429 from the telemetry feed. Recoverable: the engine cools down
    /// and retries on its own.
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    /// Any other non-success status
    #[error("HTTP {status}")]
    Http { status: u16 },

    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A configured base URL could not be turned into a request URL
    #[error("invalid URL {0}")]
    InvalidUrl(String),

    /// Body was not the JSON we expected
    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}
