//! Certificate list as served by the PKI distribution point.

use base64::{Engine, engine::general_purpose::STANDARD};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};

use crate::error::TrustStoreError;

/// The certificate list document.
///
/// All entries are standard base64 encoded DER certificates.
///
/// ```json
/// {
///   "add_roots": ["MIIC..."],
///   "ca_certs": ["MIIC..."],
///   "ee_certs": ["MIIC..."]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CertList {
    /// Additional (cross certified) roots, each issued by an existing anchor.
    #[serde(default)]
    pub add_roots: Vec<String>,
    /// Intermediate CA certificates.
    #[serde(default)]
    pub ca_certs: Vec<String>,
    /// End entity certificates (VAU encryption, IDP signing).
    #[serde(default)]
    pub ee_certs: Vec<String>,
}

impl CertList {
    /// Builds a list from DER certificates.
    #[must_use]
    pub fn from_der(add_roots: &[Vec<u8>], ca_certs: &[Vec<u8>], ee_certs: &[Vec<u8>]) -> Self {
        let encode = |certs: &[Vec<u8>]| -> Vec<String> {
            certs.iter().map(|der| STANDARD.encode(der)).collect()
        };
        Self {
            add_roots: encode(add_roots),
            ca_certs: encode(ca_certs),
            ee_certs: encode(ee_certs),
        }
    }

    /// Decodes the `add_roots` entries.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::MalformedCertList` on invalid base64 or DER.
    pub fn decode_add_roots(&self) -> Result<Vec<X509>, TrustStoreError> {
        decode_all("add_roots", &self.add_roots)
    }

    /// Decodes the `ca_certs` entries.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::MalformedCertList` on invalid base64 or DER.
    pub fn decode_ca_certs(&self) -> Result<Vec<X509>, TrustStoreError> {
        decode_all("ca_certs", &self.ca_certs)
    }

    /// Decodes the `ee_certs` entries.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::MalformedCertList` on invalid base64 or DER.
    pub fn decode_ee_certs(&self) -> Result<Vec<X509>, TrustStoreError> {
        decode_all("ee_certs", &self.ee_certs)
    }
}

fn decode_all(field: &str, entries: &[String]) -> Result<Vec<X509>, TrustStoreError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let der = STANDARD.decode(entry.trim()).map_err(|e| {
                TrustStoreError::malformed_cert_list(format!("{field}[{index}]: {e}"))
            })?;
            X509::from_der(&der).map_err(|_| {
                TrustStoreError::malformed_cert_list(format!("{field}[{index}]: not a certificate"))
            })
        })
        .collect()
}
