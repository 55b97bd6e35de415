//! Transport error types.

/// Errors produced while sending a request or reading its response.
///
/// Only conditions where no usable HTTP response exists end up here.
/// Non-success status codes are returned as regular responses so that
/// callers can inspect protocol error bodies.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Connection, TLS or I/O failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built (bad header, bad URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The redirect chain exceeded the configured limit.
    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects {
        /// Maximum number of redirects that were allowed.
        limit: usize,
    },

    /// The response body could not be decoded into the requested shape.
    #[error("Failed to decode response: {0}")]
    Decoding(String),
}

impl HttpError {
    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a new `Decoding` error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    /// Returns `true` if the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if the failure happened before any response arrived.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            Self::Decoding(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decoding(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(HttpError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            HttpError::TooManyRedirects { limit: 3 }.to_string(),
            "Too many redirects (limit 3)"
        );
        assert_eq!(
            HttpError::invalid_request("bad header").to_string(),
            "Invalid request: bad header"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(HttpError::Timeout.is_timeout());
        assert!(HttpError::Timeout.is_connection_error());
        assert!(HttpError::transport("refused").is_connection_error());
        assert!(!HttpError::decoding("eof").is_connection_error());
        assert!(!HttpError::TooManyRedirects { limit: 1 }.is_timeout());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(HttpError::from(err), HttpError::Decoding(_)));
    }
}
