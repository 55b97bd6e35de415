//! Software brainpoolP256r1 keys.

use std::path::Path;

use async_trait::async_trait;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::X509;
use sha2::{Digest, Sha256};

use super::{JwtSigner, SignatureError};
use crate::jwt::{Algorithm, BrainpoolP256r1Verifier, JwtError};

/// Length of one signature component.
const COMPONENT_LEN: i32 = 32;

/// Signs `BP256R1` with an in-memory key.
///
/// Used for test identities and for IDP side signing in integration tests.
/// Signatures are randomized, so signing the same input twice yields
/// different bytes that both verify.
#[derive(Clone)]
pub struct BrainpoolP256r1Signer {
    key: EcKey<Private>,
    certificate: Option<Vec<u8>>,
}

impl std::fmt::Debug for BrainpoolP256r1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrainpoolP256r1Signer")
            .field("has_certificate", &self.certificate.is_some())
            .finish_non_exhaustive()
    }
}

impl BrainpoolP256r1Signer {
    /// Uses `key` with an optional DER certificate.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidKey` if `key` is not on brainpoolP256r1
    /// or the certificate does not hold its public key.
    pub fn new(key: EcKey<Private>, certificate: Option<Vec<u8>>) -> Result<Self, SignatureError> {
        if key.group().curve_name() != Some(Nid::BRAINPOOL_P256R1) {
            return Err(SignatureError::invalid_key("key is not on brainpoolP256r1"));
        }
        if let Some(der) = &certificate {
            let certificate = X509::from_der(der)
                .map_err(|e| SignatureError::invalid_key(format!("certificate: {e}")))?;
            let certified = certificate.public_key()?;
            let own = PKey::from_ec_key(key.clone())?;
            if !certified.public_eq(&own) {
                return Err(SignatureError::invalid_key(
                    "certificate does not match the private key",
                ));
            }
        }
        Ok(Self { key, certificate })
    }

    /// Generates a fresh key without a certificate.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::Failed` if OpenSSL cannot generate the key.
    pub fn generate() -> Result<Self, SignatureError> {
        let group = EcGroup::from_curve_name(Nid::BRAINPOOL_P256R1)?;
        Ok(Self {
            key: EcKey::generate(&group)?,
            certificate: None,
        })
    }

    /// Uses a raw big endian private scalar with an optional DER certificate.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidKey` if the scalar is zero or not
    /// below the group order, or the certificate does not match.
    pub fn from_scalar(
        scalar: &[u8; 32],
        certificate: Option<Vec<u8>>,
    ) -> Result<Self, SignatureError> {
        let group = EcGroup::from_curve_name(Nid::BRAINPOOL_P256R1)?;
        let mut ctx = BigNumContext::new()?;
        let mut order = BigNum::new()?;
        group.order(&mut order, &mut ctx)?;

        let private = BigNum::from_slice(scalar)?;
        if private.num_bits() == 0 || private >= order {
            return Err(SignatureError::invalid_key("scalar is out of range"));
        }
        let mut public = EcPoint::new(&group)?;
        public.mul_generator(&group, &private, &ctx)?;
        let key = EcKey::from_private_components(&group, &private, &public)?;
        Self::new(key, certificate)
    }

    /// Loads a PEM private key (PKCS#8 or SEC1) and a PEM certificate.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidKey` if either input cannot be parsed
    /// or they do not belong together.
    pub fn from_pem(key_pem: &[u8], certificate_pem: &[u8]) -> Result<Self, SignatureError> {
        let key = PKey::private_key_from_pem(key_pem)
            .and_then(|key| key.ec_key())
            .map_err(|e| SignatureError::invalid_key(format!("private key: {e}")))?;
        let certificate = X509::from_pem(certificate_pem)
            .and_then(|certificate| certificate.to_der())
            .map_err(|e| SignatureError::invalid_key(format!("certificate: {e}")))?;
        Self::new(key, Some(certificate))
    }

    /// Loads key and certificate from files.
    ///
    /// The key may be PEM (PKCS#8 or SEC1) or a raw 32 byte scalar. The
    /// certificate may be PEM or DER.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::KeyNotFound` if a file cannot be read and
    /// `SignatureError::InvalidKey` if its content is unusable.
    pub fn from_files(
        key_path: impl AsRef<Path>,
        certificate_path: impl AsRef<Path>,
    ) -> Result<Self, SignatureError> {
        let read = |path: &Path| {
            std::fs::read(path)
                .map_err(|e| SignatureError::KeyNotFound(format!("{}: {e}", path.display())))
        };
        let key = read(key_path.as_ref())?;
        let mut certificate = read(certificate_path.as_ref())?;

        if certificate.starts_with(b"-----BEGIN") {
            certificate = X509::from_pem(&certificate)
                .and_then(|certificate| certificate.to_der())
                .map_err(|e| SignatureError::invalid_key(format!("certificate: {e}")))?;
        }
        if let Ok(scalar) = <&[u8; 32]>::try_from(key.as_slice()) {
            return Self::from_scalar(scalar, Some(certificate));
        }
        let key = PKey::private_key_from_pem(&key)
            .and_then(|key| key.ec_key())
            .map_err(|e| SignatureError::invalid_key(format!("private key: {e}")))?;
        Self::new(key, Some(certificate))
    }

    /// The public half of the key.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::Failed` on OpenSSL errors.
    pub fn public_key(&self) -> Result<EcKey<Public>, SignatureError> {
        Ok(EcKey::from_public_key(self.key.group(), self.key.public_key())?)
    }

    /// A verifier for signatures made by this key.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key cannot be extracted.
    pub fn verifier(&self) -> Result<BrainpoolP256r1Verifier, JwtError> {
        let public = EcKey::from_public_key(self.key.group(), self.key.public_key())?;
        BrainpoolP256r1Verifier::new(public)
    }

    fn sign_digest(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let digest = Sha256::digest(message);
        let signature = EcdsaSig::sign(&digest, &self.key)?;
        let mut raw = signature.r().to_vec_padded(COMPONENT_LEN)?;
        raw.extend(signature.s().to_vec_padded(COMPONENT_LEN)?);
        Ok(raw)
    }
}

#[async_trait]
impl JwtSigner for BrainpoolP256r1Signer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bp256r1
    }

    fn certificates(&self) -> Vec<Vec<u8>> {
        self.certificate.iter().cloned().collect()
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        self.sign_digest(message)
    }
}
