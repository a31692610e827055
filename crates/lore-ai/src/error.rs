//! Error types for lore-ai

use thiserror::Error;

/// Result type alias using lore-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to model or embedding providers
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Context overflow / too many tokens
    #[error("Context overflow: {0}")]
    ContextOverflow(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and body to an error.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Error::Auth(body),
            429 => Error::RateLimited { retry_after: None },
            413 => Error::ContextOverflow(body),
            code => Error::api(format!("http_{}", code), body),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::RateLimited { .. } => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.starts_with("http_5")
                    || et.contains("rate_limit")
                    || et.contains("overloaded")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Check if this error indicates a context overflow / too many tokens
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::ContextOverflow(_) => true,
            Error::Api { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("too many tokens")
                    || msg.contains("context length")
                    || msg.contains("context window")
                    || msg.contains("prompt is too long")
                    || msg.contains("reduce the length")
                    || msg.contains("context_length_exceeded")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_typed_variants() {
        assert!(Error::RateLimited { retry_after: Some(5) }.is_retryable());
    }

    #[test]
    fn test_retryable_server_error_status() {
        let e = Error::from_status(reqwest::StatusCode::BAD_GATEWAY, "upstream down".into());
        assert!(e.is_retryable());
    }

    #[test]
    fn test_retryable_api_overloaded_message() {
        let e = Error::api("server_error", "API is overloaded right now");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            Error::from_status(reqwest::StatusCode::UNAUTHORIZED, "nope".into()),
            Error::Auth(_)
        ));
        assert!(matches!(
            Error::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            Error::RateLimited { .. }
        ));
        assert!(matches!(
            Error::from_status(reqwest::StatusCode::PAYLOAD_TOO_LARGE, String::new()),
            Error::ContextOverflow(_)
        ));
    }

    #[test]
    fn test_not_retryable_client_errors() {
        let e = Error::from_status(reqwest::StatusCode::BAD_REQUEST, "bad field".into());
        assert!(!e.is_retryable());
        assert!(!Error::InvalidApiKey.is_retryable());
        assert!(!Error::Auth("expired".into()).is_retryable());
        assert!(!Error::UnexpectedResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn test_overflow_detection() {
        assert!(Error::ContextOverflow("too big".into()).is_context_overflow());
        let e = Error::api(
            "invalid_request_error",
            "This model's maximum context length is 8192 tokens. context_length_exceeded",
        );
        assert!(e.is_context_overflow());
        assert!(!Error::api("authentication_error", "Invalid API key").is_context_overflow());
        assert!(!Error::InvalidApiKey.is_context_overflow());
    }
}
