//! Trust store error types.

use erp_httpclient::HttpError;

/// Errors raised while loading trust material or validating certificates.
///
/// A certificate that simply does not chain to the anchor set is not an
/// error: validation returns `Ok(false)` for that case. Errors mean that a
/// decision could not be made at all, and callers must treat them as fatal.
#[derive(Debug, thiserror::Error)]
pub enum TrustStoreError {
    /// The PEM input could not be parsed as a certificate.
    #[error("Invalid PEM certificate")]
    InvalidPem,

    /// The DER input could not be parsed as a certificate.
    #[error("Invalid DER certificate")]
    InvalidDer,

    /// OpenSSL reported a failure while building or checking a chain.
    #[error("Crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    /// Fetching trust material over HTTP failed.
    #[error("Failed to fetch {what}: {source}")]
    Fetch {
        /// What was being fetched.
        what: &'static str,
        /// Underlying transport error.
        #[source]
        source: HttpError,
    },

    /// The distribution point answered with a non-success status.
    #[error("Unexpected HTTP status {status} while fetching {what}")]
    UnexpectedStatus {
        /// What was being fetched.
        what: &'static str,
        /// The HTTP status code.
        status: u16,
    },

    /// The certificate list document could not be decoded.
    #[error("Malformed certificate list: {0}")]
    MalformedCertList(String),

    /// No usable root certificate is available.
    #[error("No trusted root certificate available")]
    NoRootCertificate,

    /// The VAU certificate is missing or did not validate.
    #[error("No trusted VAU certificate available")]
    NoVauCertificate,

    /// The trust store configuration is incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TrustStoreError {
    /// Creates a new `MalformedCertList` error.
    #[must_use]
    pub fn malformed_cert_list(message: impl Into<String>) -> Self {
        Self::MalformedCertList(message.into())
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` if trust material could not be retrieved.
    ///
    /// These are the only trust store errors where retrying may help.
    #[must_use]
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::UnexpectedStatus { .. })
    }

    /// Returns `true` if input data could not be parsed.
    #[must_use]
    pub fn is_malformed_data(&self) -> bool {
        matches!(
            self,
            Self::InvalidPem | Self::InvalidDer | Self::MalformedCertList(_)
        )
    }
}
