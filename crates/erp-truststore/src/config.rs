//! Trust store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TrustStoreError;

/// Where trust material is fetched from and how long it is cached.
///
/// # Example (TOML)
///
/// ```toml
/// cert_list_url = "https://erp.example.com/CertList"
/// vau_certificate_url = "https://erp.example.com/VAUCertificate"
/// anchor_ttl = "12h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustStoreConfig {
    /// Certificate list distribution point.
    pub cert_list_url: Option<Url>,

    /// VAU encryption certificate endpoint (DER body).
    pub vau_certificate_url: Option<Url>,

    /// How long an assembled trust store is reused before re-fetching.
    #[serde(with = "humantime_serde")]
    pub anchor_ttl: Duration,
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            cert_list_url: None,
            vau_certificate_url: None,
            anchor_ttl: Duration::from_secs(12 * 3600),
        }
    }
}

impl TrustStoreConfig {
    /// Creates a configuration for the given certificate list URL.
    #[must_use]
    pub fn new(cert_list_url: Url) -> Self {
        Self {
            cert_list_url: Some(cert_list_url),
            ..Self::default()
        }
    }

    /// Sets the VAU certificate URL.
    #[must_use]
    pub fn with_vau_certificate_url(mut self, url: Url) -> Self {
        self.vau_certificate_url = Some(url);
        self
    }

    /// Sets the cache lifetime.
    #[must_use]
    pub fn with_anchor_ttl(mut self, ttl: Duration) -> Self {
        self.anchor_ttl = ttl;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::Configuration` if no certificate list URL is
    /// set or the TTL is zero.
    pub fn validate(&self) -> Result<(), TrustStoreError> {
        if self.cert_list_url.is_none() {
            return Err(TrustStoreError::configuration("cert_list_url is required"));
        }
        if self.anchor_ttl.is_zero() {
            return Err(TrustStoreError::configuration("anchor_ttl must be > 0"));
        }
        Ok(())
    }
}
