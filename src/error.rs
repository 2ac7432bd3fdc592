//! Error types for the fieldwise crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for fieldwise operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the fieldwise crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A field specification failed validation before the run started.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No input file exists at the given path.
    #[error("Missing input file: {}", .0.display())]
    MissingInput(PathBuf),

    /// The model API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limit exceeded.
    #[error("Rate limited. Retry after {retry_after} seconds")]
    RateLimit {
        /// Seconds to wait before retrying
        retry_after: u64,
        /// Error message
        message: String,
    },

    /// The model's response did not carry a usable structured output.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Network or HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request timeout.
    #[error("Request timed out")]
    Timeout,
}

impl Error {
    /// Create an API error from a non-success response.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        // The error envelope is {"error": {"message": ...}}; fall back to the
        // raw body when it doesn't parse.
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.map(|d| d.message))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    "Unknown error".into()
                } else {
                    body
                }
            });

        match status {
            401 => Error::Authentication(message),
            429 => Error::RateLimit {
                retry_after,
                message,
            },
            _ => Error::Api { status, message },
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(serde::Deserialize)]
struct ErrorDetail {
    message: String,
}
