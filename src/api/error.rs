//! Error types for the backend client.

use thiserror::Error;

/// Errors that can occur while talking to the conversation backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived, or the body stream broke.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("HTTP error! status: {status} ({url})")]
    Status {
        /// Numeric HTTP status.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Base URL or endpoint could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response body was not the expected JSON.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Response carried no body.
    #[error("Response body is null")]
    EmptyBody,
}

impl ApiError {
    /// Check if this error happened at the transport level (no usable response).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::HttpRequest(_))
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience result alias for backend operations.
pub type ApiResult<T> = Result<T, ApiError>;
