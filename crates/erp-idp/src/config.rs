//! IDP session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required value is missing or empty.
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    /// A value is present but unusable.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates a new `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

fn default_scopes() -> Vec<String> {
    vec!["e-rezept".to_string(), "openid".to_string()]
}

pub(crate) fn default_signer_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_clock_skew() -> Duration {
    Duration::from_secs(60)
}

fn default_discovery_max_age() -> Duration {
    Duration::from_secs(3600)
}

/// Static parameters of an [`IdpSession`](crate::IdpSession).
///
/// # Example (TOML)
///
/// ```toml
/// client_id = "eRezeptApp"
/// discovery_url = "https://idp.example.com/.well-known/openid-configuration"
/// redirect_uri = "https://redirect.example.com/erezept"
/// ext_auth_redirect_uri = "https://app.example.com/extauth"
/// scopes = ["e-rezept", "openid"]
/// signer_timeout = "60s"
/// clock_skew = "1m"
/// discovery_max_age = "1h"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdpSessionConfig {
    /// OAuth client identifier.
    pub client_id: String,

    /// Location of the signed discovery document.
    pub discovery_url: Url,

    /// Redirect URI registered for the client.
    pub redirect_uri: Url,

    /// Universal link the insurer app returns to after external authentication.
    pub ext_auth_redirect_uri: Url,

    /// Requested scopes. Must include `openid`.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Upper bound for a single signer operation.
    #[serde(default = "default_signer_timeout", with = "humantime_serde")]
    pub signer_timeout: Duration,

    /// Tolerance when comparing token and challenge expiry against the local clock.
    #[serde(default = "default_clock_skew", with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Maximum time a discovery document is reused, even if it claims a later `exp`.
    #[serde(default = "default_discovery_max_age", with = "humantime_serde")]
    pub discovery_max_age: Duration,

    /// Allow a plain `http` discovery URL. Only for local test servers.
    #[serde(default)]
    pub allow_insecure_http: bool,
}

impl IdpSessionConfig {
    /// Creates a configuration with default scopes and timeouts.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        discovery_url: Url,
        redirect_uri: Url,
        ext_auth_redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            discovery_url,
            redirect_uri,
            ext_auth_redirect_uri,
            scopes: default_scopes(),
            signer_timeout: default_signer_timeout(),
            clock_skew: default_clock_skew(),
            discovery_max_age: default_discovery_max_age(),
            allow_insecure_http: false,
        }
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the signer timeout.
    #[must_use]
    pub fn with_signer_timeout(mut self, timeout: Duration) -> Self {
        self.signer_timeout = timeout;
        self
    }

    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets the discovery cache bound.
    #[must_use]
    pub fn with_discovery_max_age(mut self, max_age: Duration) -> Self {
        self.discovery_max_age = max_age;
        self
    }

    /// Allows an `http` discovery URL.
    #[must_use]
    pub fn with_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    /// The scope parameter value.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty client id, missing `openid` scope,
    /// zero timeouts or an `http` discovery URL without opting in.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client_id"));
        }
        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(ConfigError::invalid_value("scopes", "must include openid"));
        }
        if self.signer_timeout.is_zero() {
            return Err(ConfigError::invalid_value("signer_timeout", "must be > 0"));
        }
        if self.discovery_max_age.is_zero() {
            return Err(ConfigError::invalid_value(
                "discovery_max_age",
                "must be > 0",
            ));
        }
        match self.discovery_url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {
                tracing::warn!(url = %self.discovery_url, "using insecure discovery URL");
            }
            scheme => {
                return Err(ConfigError::invalid_value(
                    "discovery_url",
                    format!("scheme {scheme} is not allowed"),
                ));
            }
        }
        Ok(())
    }
}
