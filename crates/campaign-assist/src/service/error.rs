//! Analysis service error types.

use thiserror::Error;

/// Errors talking to the analysis service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The URL to analyze, or a URL built from the base URL, is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("Service responded {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl ServiceError {
    /// True for 4xx/5xx responses.
    pub fn is_http_status(&self) -> bool {
        matches!(self, ServiceError::Http { .. })
    }
}
