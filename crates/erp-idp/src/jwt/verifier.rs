//! Signature verification for the supported algorithms.

use openssl::bn::BigNum;
use openssl::ec::EcKey;
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use openssl::pkey::Public;
use openssl::x509::{X509, X509Ref};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};

use super::JwtError;

/// Raw `r || s` length for 256 bit curves.
const SIGNATURE_LEN: usize = 64;

/// Checks a signature over a message.
pub trait JwtVerifier: Send + Sync {
    /// Returns `Ok(true)` if `signature` is valid for `message`.
    ///
    /// A signature of the right size that does not match returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::MalformedSignature` if the signature has the wrong size.
    fn verify(&self, signature: &[u8], message: &[u8]) -> Result<bool, JwtError>;
}

fn check_len(signature: &[u8]) -> Result<(), JwtError> {
    if signature.len() == SIGNATURE_LEN {
        Ok(())
    } else {
        Err(JwtError::MalformedSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )))
    }
}

// =============================================================================
// BP256R1
// =============================================================================

/// Verifies `BP256R1` signatures with a brainpoolP256r1 public key.
#[derive(Clone)]
pub struct BrainpoolP256r1Verifier {
    key: EcKey<Public>,
}

impl std::fmt::Debug for BrainpoolP256r1Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BrainpoolP256r1Verifier")
    }
}

impl BrainpoolP256r1Verifier {
    /// Uses `key`, which must be on brainpoolP256r1.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::UnsupportedAlgorithm` for any other curve.
    pub fn new(key: EcKey<Public>) -> Result<Self, JwtError> {
        match key.group().curve_name() {
            Some(Nid::BRAINPOOL_P256R1) => Ok(Self { key }),
            other => Err(JwtError::UnsupportedAlgorithm(format!(
                "expected brainpoolP256r1 key, got {}",
                curve_name(other)
            ))),
        }
    }

    /// Uses the public key of `certificate`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::UnsupportedAlgorithm` if the certificate does not
    /// hold a brainpoolP256r1 key.
    pub fn from_certificate(certificate: &X509Ref) -> Result<Self, JwtError> {
        let key = certificate
            .public_key()?
            .ec_key()
            .map_err(|_| JwtError::UnsupportedAlgorithm("certificate key is not EC".into()))?;
        Self::new(key)
    }
}

impl JwtVerifier for BrainpoolP256r1Verifier {
    fn verify(&self, signature: &[u8], message: &[u8]) -> Result<bool, JwtError> {
        check_len(signature)?;
        let (r, s) = signature.split_at(SIGNATURE_LEN / 2);
        let signature =
            EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
        let digest = Sha256::digest(message);

        // Out of range components are reported as errors by OpenSSL; they
        // are still just a signature that does not match.
        match signature.verify(&digest, &self.key) {
            Ok(valid) => Ok(valid),
            Err(err) => {
                tracing::debug!(error = %err, "BP256R1 verification rejected signature");
                Ok(false)
            }
        }
    }
}

// =============================================================================
// ES256
// =============================================================================

/// Verifies `ES256` signatures with a P-256 public key.
#[derive(Debug, Clone)]
pub struct Es256Verifier {
    key: VerifyingKey,
}

impl Es256Verifier {
    /// Uses `key`.
    #[must_use]
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parses a DER `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Crypto` if the input is not a P-256 public key.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self, JwtError> {
        VerifyingKey::from_public_key_der(der)
            .map(Self::new)
            .map_err(|e| JwtError::Crypto(format!("P-256 public key: {e}")))
    }

    /// Parses a SEC1 encoded point.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Crypto` if the input is not a P-256 point.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, JwtError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self::new)
            .map_err(|e| JwtError::Crypto(format!("P-256 public key: {e}")))
    }
}

impl JwtVerifier for Es256Verifier {
    fn verify(&self, signature: &[u8], message: &[u8]) -> Result<bool, JwtError> {
        check_len(signature)?;
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(self.key.verify(message, &signature).is_ok())
    }
}

// =============================================================================
// Certificate dispatch
// =============================================================================

/// Picks a verifier for the key in a DER certificate.
///
/// # Errors
///
/// - `JwtError::Crypto` if the input is not a certificate
/// - `JwtError::UnsupportedAlgorithm` for keys other than brainpoolP256r1 and P-256
pub fn verifier_for_certificate(der: &[u8]) -> Result<Box<dyn JwtVerifier>, JwtError> {
    let certificate = X509::from_der(der)?;
    let key = certificate.public_key()?;
    let ec = key
        .ec_key()
        .map_err(|_| JwtError::UnsupportedAlgorithm("certificate key is not EC".into()))?;

    match ec.group().curve_name() {
        Some(Nid::BRAINPOOL_P256R1) => Ok(Box::new(BrainpoolP256r1Verifier::new(ec)?)),
        Some(Nid::X9_62_PRIME256V1) => Ok(Box::new(Es256Verifier::from_public_key_der(
            &key.public_key_to_der()?,
        )?)),
        other => Err(JwtError::UnsupportedAlgorithm(curve_name(other))),
    }
}

fn curve_name(nid: Option<Nid>) -> String {
    nid.and_then(|nid| nid.short_name().ok())
        .unwrap_or("unnamed curve")
        .to_string()
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::Signer as _;
    use p256::pkcs8::EncodePublicKey;

    use super::*;

    const IDP_SIG: &str = include_str!("../../tests/fixtures/idp_sig.pem");

    #[test]
    fn test_es256_verify() {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let signature: Signature = key.sign(b"header.payload");
        let der = key.verifying_key().to_public_key_der().unwrap();
        let verifier = Es256Verifier::from_public_key_der(der.as_bytes()).unwrap();

        assert!(verifier.verify(&signature.to_bytes(), b"header.payload").unwrap());
        assert!(!verifier.verify(&signature.to_bytes(), b"header.payloaD").unwrap());
        assert!(!verifier.verify(&[0u8; 64], b"header.payload").unwrap());
        assert!(matches!(
            verifier.verify(&[1u8; 63], b"header.payload"),
            Err(JwtError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_brainpool_rejects_out_of_range_signature() {
        let certificate = X509::from_pem(IDP_SIG.as_bytes()).unwrap();
        let verifier = BrainpoolP256r1Verifier::from_certificate(&certificate).unwrap();
        assert!(!verifier.verify(&[0xff; 64], b"message").unwrap());
        assert!(!verifier.verify(&[0x00; 64], b"message").unwrap());
    }

    #[test]
    fn test_verifier_for_certificate() {
        let der = X509::from_pem(IDP_SIG.as_bytes()).unwrap().to_der().unwrap();
        assert!(verifier_for_certificate(&der).is_ok());
        assert!(matches!(
            verifier_for_certificate(b"junk"),
            Err(JwtError::Crypto(_))
        ));
    }

    #[test]
    fn test_brainpool_rejects_other_curves() {
        let group = openssl::ec::EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let private = EcKey::generate(&group).unwrap();
        let public = EcKey::from_public_key(&group, private.public_key()).unwrap();
        assert!(matches!(
            BrainpoolP256r1Verifier::new(public),
            Err(JwtError::UnsupportedAlgorithm(_))
        ));
    }
}
