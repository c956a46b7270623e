//! Common error types for the outreach engine

use thiserror::Error;

/// Common result type for outreach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across outreach crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound HTTP request error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// External provider rejected a request (non-2xx with body)
    #[error("Provider error: {0}")]
    Provider(String),

    /// External provider returned a transient failure (timeout or 5xx)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not valid in the current pipeline state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry layer may re-attempt the failed operation.
    ///
    /// Timeouts, connection failures, and 5xx-class provider responses are
    /// transient; everything else fails immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            Error::ProviderUnavailable(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_is_retryable() {
        assert!(Error::ProviderUnavailable("503".to_string()).is_retryable());
    }

    #[test]
    fn input_errors_are_not_retryable() {
        assert!(!Error::InvalidInput("bad".to_string()).is_retryable());
        assert!(!Error::NotFound("gone".to_string()).is_retryable());
        assert!(!Error::Provider("400 bad request".to_string()).is_retryable());
    }
}
