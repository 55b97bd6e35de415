//! Client configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`DefaultHttpClient`](crate::DefaultHttpClient).
///
/// # Example (TOML)
///
/// ```toml
/// timeout = "30s"
/// connect_timeout = "10s"
/// max_redirects = 10
///
/// [additional_headers]
/// X-Authorization = "api-key"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Total timeout per request, redirects included.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Maximum number of redirect hops followed for one request.
    pub max_redirects: usize,

    /// Value of the `User-Agent` header.
    pub user_agent: String,

    /// Headers added to every request.
    pub additional_headers: BTreeMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            user_agent: concat!("erx-idp/", env!("CARGO_PKG_VERSION")).to_string(),
            additional_headers: BTreeMap::new(),
        }
    }
}

impl HttpClientConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the redirect limit.
    #[must_use]
    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_additional_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 10);
        assert!(config.user_agent.starts_with("erx-idp/"));
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: HttpClientConfig = serde_json::from_str(
            r#"{"timeout": "5s", "max_redirects": 2, "additional_headers": {"X-Key": "1"}}"#,
        )
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_redirects, 2);
        assert_eq!(config.additional_headers.get("X-Key").map(String::as_str), Some("1"));
    }
}
