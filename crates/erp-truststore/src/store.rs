//! Chain validation against an anchor set.

use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509VerifyParam;
use openssl::x509::{X509, X509Ref, X509StoreContext, X509VerifyResult};
use time::OffsetDateTime;
use x509_parser::parse_x509_certificate;

use crate::anchor::TrustAnchor;
use crate::cert_list::CertList;
use crate::certificate::{parse_der, subject_common_name};
use crate::error::TrustStoreError;

/// An immutable set of trust anchors plus untrusted intermediates.
///
/// A certificate is accepted when OpenSSL can build a chain from it through
/// the intermediates to one of the anchors, with every link signed by the
/// next and every link inside its validity period at the checked instant.
/// Only end entity certificates are accepted: anchors and CA certificates
/// never validate as leaves.
#[derive(Clone)]
pub struct TrustStore {
    anchors: Vec<X509>,
    intermediates: Vec<X509>,
    ee_certs: Vec<X509>,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |certs: &[X509]| -> Vec<String> {
            certs
                .iter()
                .map(|c| subject_common_name(c).unwrap_or_default())
                .collect()
        };
        f.debug_struct("TrustStore")
            .field("anchors", &names(&self.anchors))
            .field("intermediates", &names(&self.intermediates))
            .field("ee_certs", &names(&self.ee_certs))
            .finish()
    }
}

impl TrustStore {
    /// Creates a store trusting exactly `anchors`.
    #[must_use]
    pub fn new<'a>(anchors: impl IntoIterator<Item = &'a TrustAnchor>) -> Self {
        Self {
            anchors: anchors.into_iter().map(TrustAnchor::to_x509).collect(),
            intermediates: Vec::new(),
            ee_certs: Vec::new(),
        }
    }

    /// Adds untrusted intermediates used for chain building.
    #[must_use]
    pub fn with_intermediates(mut self, intermediates: impl IntoIterator<Item = X509>) -> Self {
        self.intermediates.extend(intermediates);
        self
    }

    /// Assembles a store from a distributed certificate list.
    ///
    /// `add_roots` entries become anchors only if they validate against the
    /// bootstrap anchors at `at`. CA certificates are kept as intermediates.
    /// End entity certificates are kept only if they validate.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::MalformedCertList` if any entry cannot be decoded.
    pub fn from_cert_list(
        bootstrap: &[TrustAnchor],
        list: &CertList,
        at: OffsetDateTime,
    ) -> Result<Self, TrustStoreError> {
        if bootstrap.is_empty() {
            return Err(TrustStoreError::NoRootCertificate);
        }

        let base = Self::new(bootstrap);
        let mut anchors = base.anchors.clone();
        for root in list.decode_add_roots()? {
            if base.chains_to_anchor(&root, at)? {
                anchors.push(root);
            } else {
                tracing::warn!(
                    subject = ?subject_common_name(&root),
                    "dropping additional root that does not chain to the bootstrap anchor"
                );
            }
        }

        let mut store = Self {
            anchors,
            intermediates: list.decode_ca_certs()?,
            ee_certs: Vec::new(),
        };

        for ee in list.decode_ee_certs()? {
            if store.validate_at(&ee, at)? {
                store.ee_certs.push(ee);
            } else {
                tracing::warn!(
                    subject = ?subject_common_name(&ee),
                    "dropping untrusted end entity certificate"
                );
            }
        }

        tracing::debug!(
            anchors = store.anchors.len(),
            intermediates = store.intermediates.len(),
            ee_certs = store.ee_certs.len(),
            "trust store assembled"
        );
        Ok(store)
    }

    /// Validates `certificate` now.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::Crypto` if OpenSSL cannot run the check.
    pub fn validate(&self, certificate: &X509Ref) -> Result<bool, TrustStoreError> {
        self.validate_at(certificate, OffsetDateTime::now_utc())
    }

    /// Validates a DER certificate now.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::InvalidDer` for malformed input.
    pub fn validate_der(&self, der: &[u8]) -> Result<bool, TrustStoreError> {
        let certificate = parse_der(der)?;
        self.validate(&certificate)
    }

    /// Validates `certificate` as an end entity as of `at`.
    ///
    /// Self-signed certificates and certificates marked `CA:TRUE` are
    /// rejected even when they chain to an anchor.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::Crypto` if OpenSSL cannot run the check.
    pub fn validate_at(
        &self,
        certificate: &X509Ref,
        at: OffsetDateTime,
    ) -> Result<bool, TrustStoreError> {
        if !is_end_entity(certificate)? {
            tracing::warn!(
                subject = ?subject_common_name(certificate),
                "certificate rejected: not an end entity certificate"
            );
            return Ok(false);
        }
        self.chains_to_anchor(certificate, at)
    }

    fn chains_to_anchor(
        &self,
        certificate: &X509Ref,
        at: OffsetDateTime,
    ) -> Result<bool, TrustStoreError> {
        let mut builder = X509StoreBuilder::new()?;
        for anchor in &self.anchors {
            builder.add_cert(anchor.clone())?;
        }
        let mut param = X509VerifyParam::new()?;
        param.set_time(at.unix_timestamp() as _);
        builder.set_param(&param)?;
        let store = builder.build();

        let mut chain = Stack::new()?;
        for intermediate in &self.intermediates {
            chain.push(intermediate.clone())?;
        }

        let mut context = X509StoreContext::new()?;
        let (valid, reason) = context.init(&store, certificate, &chain, |ctx| {
            let valid = ctx.verify_cert()?;
            Ok((valid, ctx.error().error_string()))
        })?;

        if !valid {
            tracing::warn!(
                subject = ?subject_common_name(certificate),
                reason,
                "certificate rejected"
            );
        }
        Ok(valid)
    }

    /// The primary anchor.
    #[must_use]
    pub fn root_certificate(&self) -> Option<&X509> {
        self.anchors.first()
    }

    /// All anchors, bootstrap first.
    #[must_use]
    pub fn anchors(&self) -> &[X509] {
        &self.anchors
    }

    /// End entity certificates that validated when the store was assembled.
    #[must_use]
    pub fn ee_certificates(&self) -> &[X509] {
        &self.ee_certs
    }
}

fn is_end_entity(certificate: &X509Ref) -> Result<bool, TrustStoreError> {
    if certificate.issued(certificate) == X509VerifyResult::OK {
        return Ok(false);
    }
    let der = certificate.to_der()?;
    let (_, parsed) = parse_x509_certificate(&der).map_err(|_| TrustStoreError::InvalidDer)?;
    let is_ca = matches!(parsed.basic_constraints(), Ok(Some(bc)) if bc.value.ca);
    Ok(!is_ca)
}
