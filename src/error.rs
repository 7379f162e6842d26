//! Client factory error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for client factory operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// Errors surfaced by clients, pipelines, and registries.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Request failed after all retry attempts were used up.
    #[error("request failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Number of attempts made (initial call plus retries).
        attempts: u32,
        /// Last underlying failure.
        #[source]
        source: Box<HttpClientError>,
    },

    /// Circuit breaker rejected the call without attempting it.
    #[error("circuit breaker is open, request rejected")]
    CircuitOpen,

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection error (DNS, TCP, TLS).
    #[error("connection error: {0}")]
    Connection(String),

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Response carried an error status.
    #[error("response error: {status} - {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// No client registered under the given name or type.
    #[error("no client registered for identity: {0}")]
    UnknownClient(String),

    /// No policy registered under the given key.
    #[error("no policy registered for key: {0}")]
    UnknownPolicy(String),

    /// A client was already registered under the given name or type.
    #[error("client already registered: {0}")]
    DuplicateRegistration(String),

    /// A policy was already registered under the given key.
    #[error("policy key already registered: {0}")]
    DuplicateKey(String),

    /// Invalid registration-time configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Underlying HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl HttpClientError {
    /// Check if this error represents a transient failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Connection(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Response { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_)) || matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_)) || matches!(self, Self::Http(e) if e.is_connect())
    }

    /// Check if this is a configuration-time error (never retried).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownClient(_)
                | Self::UnknownPolicy(_)
                | Self::DuplicateRegistration(_)
                | Self::DuplicateKey(_)
                | Self::Configuration(_)
        )
    }

    /// Get the HTTP status code if this is a response error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(HttpClientError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(HttpClientError::Connection("refused".into()).is_retryable());
        assert!(
            HttpClientError::Response {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !HttpClientError::Response {
                status: 404,
                message: "not found".into()
            }
            .is_retryable()
        );
        assert!(!HttpClientError::CircuitOpen.is_retryable());
        assert!(!HttpClientError::UnknownClient("svc".into()).is_retryable());
    }

    #[test]
    fn configuration_errors_are_flagged() {
        assert!(HttpClientError::DuplicateKey("regular".into()).is_configuration());
        assert!(HttpClientError::UnknownPolicy("long".into()).is_configuration());
        assert!(!HttpClientError::CircuitOpen.is_configuration());
    }

    #[test]
    fn retry_exhausted_reports_source_status() {
        let err = HttpClientError::RetryExhausted {
            attempts: 4,
            source: Box::new(HttpClientError::Response {
                status: 502,
                message: "bad gateway".into(),
            }),
        };
        assert!(err.to_string().contains("4 attempts"));
    }
}
