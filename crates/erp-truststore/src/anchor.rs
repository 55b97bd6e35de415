//! Trust anchors.

use std::fmt;

use openssl::x509::{X509, X509Ref};

use crate::certificate::subject_common_name;
use crate::error::TrustStoreError;

/// A root certificate trusted without further proof.
///
/// Two anchors are equal when their DER encodings are identical.
#[derive(Clone)]
pub struct TrustAnchor {
    certificate: X509,
    der: Vec<u8>,
}

impl TrustAnchor {
    /// Parses a PEM encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::InvalidPem` if the input is not a PEM certificate.
    pub fn from_pem(pem: &str) -> Result<Self, TrustStoreError> {
        let certificate =
            X509::from_pem(pem.as_bytes()).map_err(|_| TrustStoreError::InvalidPem)?;
        Self::from_certificate(certificate)
    }

    /// Parses a DER encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::InvalidDer` if the input is not a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, TrustStoreError> {
        let certificate = X509::from_der(der).map_err(|_| TrustStoreError::InvalidDer)?;
        Self::from_certificate(certificate)
    }

    /// Wraps an already parsed certificate.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::Crypto` if the certificate cannot be re-encoded.
    pub fn from_certificate(certificate: X509) -> Result<Self, TrustStoreError> {
        let der = certificate.to_der()?;
        Ok(Self { certificate, der })
    }

    /// The anchor certificate.
    #[must_use]
    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    /// The DER encoding of the anchor certificate.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub(crate) fn to_x509(&self) -> X509 {
        self.certificate.clone()
    }
}

impl PartialEq for TrustAnchor {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for TrustAnchor {}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("subject", &subject_common_name(&self.certificate))
            .finish()
    }
}
