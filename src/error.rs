//! Error types for Rustible Elastic.
//!
//! This module defines the error type shared by the API clients, the polling
//! primitive and the configuration loader.

use thiserror::Error;

/// Result type alias for Rustible Elastic operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Rustible Elastic.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("{method} {path} returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// HTTP method of the failed request
        method: String,
        /// Request path (without host)
        path: String,
        /// Error reason extracted from the response body
        message: String,
    },

    /// A base URL or request path could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Login was rejected or no session token was returned.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    // ========================================================================
    // Response Errors
    // ========================================================================
    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// A named remote object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of object (deployment, agent policy, ...)
        kind: String,
        /// Name or id that was looked up
        name: String,
    },

    /// A polled condition did not become true in time.
    #[error("Timed out after {timeout_secs} seconds waiting for {what}")]
    Timeout {
        /// Description of the awaited condition
        what: String,
        /// Timeout in seconds
        timeout_secs: u64,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates a new not-found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates a new invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the remote API answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Api { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/// Extension for turning 404 responses into `None`.
pub trait OptionalExt<T> {
    /// Maps a not-found API error to `Ok(None)`.
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16) -> Error {
        Error::Api {
            status,
            method: "GET".to_string(),
            path: "/api/status".to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_not_found_detection() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(500).is_not_found());
        assert!(!Error::Config("x".into()).is_not_found());
    }

    #[test]
    fn test_optional_maps_404_only() {
        let missing: Result<u8> = Err(api_error(404));
        assert!(matches!(missing.optional(), Ok(None)));

        let failed: Result<u8> = Err(api_error(403));
        assert!(failed.optional().is_err());

        let found: Result<u8> = Ok(7);
        assert_eq!(found.optional().unwrap(), Some(7));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(api_error(503).is_transient());
        assert!(api_error(429).is_transient());
        assert!(!api_error(400).is_transient());
    }

    #[test]
    fn test_display() {
        let err = api_error(409);
        assert_eq!(err.to_string(), "GET /api/status returned 409: boom");
        let err = Error::not_found("deployment", "prod");
        assert_eq!(err.to_string(), "deployment 'prod' not found");
    }
}
