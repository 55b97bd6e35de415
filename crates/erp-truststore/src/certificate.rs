//! Certificate helpers shared by the store and its callers.

use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::x509::{X509, X509NameRef, X509Ref};
use time::OffsetDateTime;

use crate::error::TrustStoreError;

/// Parses a DER certificate.
///
/// # Errors
///
/// Returns `TrustStoreError::InvalidDer` on malformed input.
pub fn parse_der(der: &[u8]) -> Result<X509, TrustStoreError> {
    X509::from_der(der).map_err(|_| TrustStoreError::InvalidDer)
}

/// Parses every certificate in a PEM bundle.
///
/// # Errors
///
/// Returns `TrustStoreError::InvalidPem` if the bundle is malformed or empty.
pub fn parse_pem_bundle(pem: &str) -> Result<Vec<X509>, TrustStoreError> {
    let certificates = X509::stack_from_pem(pem.as_bytes()).map_err(|_| TrustStoreError::InvalidPem)?;
    if certificates.is_empty() {
        return Err(TrustStoreError::InvalidPem);
    }
    Ok(certificates)
}

fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
}

/// The subject common name, if present.
#[must_use]
pub fn subject_common_name(certificate: &X509Ref) -> Option<String> {
    common_name(certificate.subject_name())
}

/// The issuer common name, if present.
#[must_use]
pub fn issuer_common_name(certificate: &X509Ref) -> Option<String> {
    common_name(certificate.issuer_name())
}

/// The end of the validity period.
///
/// # Errors
///
/// Returns `TrustStoreError::Crypto` if the ASN.1 time cannot be compared.
pub fn not_after(certificate: &X509Ref) -> Result<OffsetDateTime, TrustStoreError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(certificate.not_after())?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| TrustStoreError::malformed_cert_list(format!("notAfter out of range: {e}")))
}

/// The serial number as upper case hex.
///
/// # Errors
///
/// Returns `TrustStoreError::Crypto` if the serial cannot be converted.
pub fn serial_number_hex(certificate: &X509Ref) -> Result<String, TrustStoreError> {
    let serial = certificate.serial_number().to_bn()?;
    Ok(serial.to_hex_str()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDP_SIG: &str = include_str!("../tests/fixtures/idp_sig.pem");
    const EXPIRED: &str = include_str!("../tests/fixtures/expired.pem");

    #[test]
    fn test_names() {
        let cert = X509::from_pem(IDP_SIG.as_bytes()).unwrap();
        assert_eq!(subject_common_name(&cert).as_deref(), Some("IDP Sig 1"));
        assert_eq!(
            issuer_common_name(&cert).as_deref(),
            Some("GEM.KOMP-CA1 TEST-ONLY")
        );
    }

    #[test]
    fn test_not_after() {
        let cert = X509::from_pem(EXPIRED.as_bytes()).unwrap();
        let not_after = not_after(&cert).unwrap();
        assert_eq!(not_after.year(), 2021);
        assert!(not_after < OffsetDateTime::now_utc());
    }

    #[test]
    fn test_pem_bundle() {
        let bundle = format!("{IDP_SIG}{EXPIRED}");
        assert_eq!(parse_pem_bundle(&bundle).unwrap().len(), 2);
        assert!(matches!(parse_pem_bundle(""), Err(TrustStoreError::InvalidPem)));
    }

    #[test]
    fn test_serial_number_hex() {
        let cert = X509::from_pem(IDP_SIG.as_bytes()).unwrap();
        let serial = serial_number_hex(&cert).unwrap();
        assert!(!serial.is_empty());
        assert!(serial.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
