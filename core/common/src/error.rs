//! Common error types for campusdrive.

use thiserror::Error;

/// Top-level error type for drive, session and tabular operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential acquisition or refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote API answered with an unexpected status.
    #[error("Upstream error: {status} - {body}")]
    Upstream {
        /// HTTP status code returned by the remote API.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller asked for something the current state does not allow.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Content is not a well-formed spreadsheet.
    #[error("Decode error: {0}")]
    Decode(String),

    /// No response was received from the remote API.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an upstream error from a status code and response body.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_carries_status_and_body() {
        let err = Error::upstream(503, "service unavailable");
        assert_eq!(
            err.to_string(),
            "Upstream error: 503 - service unavailable"
        );
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
