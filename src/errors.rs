//! Error types for the relay service
//!
//! One error enum covering the full failure taxonomy: configuration
//! errors, request validation, upstream provider failures, and the
//! usual serialization/IO conversions.

use thiserror::Error;

/// Main error type for the relay service
#[derive(Error, Debug)]
pub enum RelayError {
    /// Requested provider name is not a known backend kind
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider is known but was never configured/registered
    #[error("Provider {0} is not available")]
    ProviderUnavailable(String),

    /// Request parameter outside its allowed range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// Prompt template failed validation
    #[error("Invalid prompt template: {0}")]
    InvalidTemplate(String),

    /// Any failure talking to a backend: network error, non-2xx status,
    /// timeout, or a broken streaming connection. Conversation state is
    /// never modified once this is raised.
    #[error("Upstream provider failure: {0}")]
    Upstream(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// HTTP client failures collapse into the single upstream condition
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Upstream(format!("request timed out: {}", err))
        } else {
            RelayError::Upstream(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::InvalidParameter {
            field: "temperature",
            reason: "2.5 is above the maximum of 2.0".to_string(),
        };
        assert!(err.to_string().contains("temperature"));
        assert!(err.to_string().contains("2.5"));
    }

    #[test]
    fn test_provider_unavailable_display() {
        let err = RelayError::ProviderUnavailable("ollama".to_string());
        assert!(err.to_string().contains("ollama"));
    }
}
