//! Request Error Types
//!
//! Failures a dispatched request can end with. Maps HTTP status codes to
//! specific variants and decides which ones feed the retry policy.

use super::retry::RetryPolicy;

/// Request error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Request timeout")]
    Timeout,

    #[error("No connection: {0}")]
    NoConnection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed (HTTP {0})")]
    AuthFailure(u16),

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No cached response")]
    CacheMiss,
}

impl RequestError {
    /// Whether this error may be retried under `policy`
    pub fn is_recoverable(&self, policy: &RetryPolicy) -> bool {
        match self {
            RequestError::Timeout
            | RequestError::NoConnection(_)
            | RequestError::Network(_)
            | RequestError::AuthFailure(_) => true,
            RequestError::Server { .. } => policy.retry_server_errors,
            RequestError::Parse(_) | RequestError::CacheMiss => false,
        }
    }

    /// Create a RequestError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => RequestError::AuthFailure(status),
            408 => RequestError::Timeout,
            _ => RequestError::Server {
                status,
                body: body.to_string(),
            },
        }
    }
}
