//! Device bound P-256 keys.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use tokio::sync::RwLock;

use super::{JwtSigner, SignatureError};
use crate::jwt::Algorithm;

/// A key store whose private keys never leave the device.
///
/// Keys are addressed by tag. Implementations for hardware key stores
/// live with the host platform; [`SoftwareSecureElement`] keeps keys in
/// memory.
#[async_trait]
pub trait SecureElement: Send + Sync {
    /// Creates a new key under `tag`, returning its DER `SubjectPublicKeyInfo`.
    ///
    /// An existing key with the same tag is replaced.
    async fn generate_key(&self, tag: &str) -> Result<Vec<u8>, SignatureError>;

    /// Returns the DER `SubjectPublicKeyInfo` of the key under `tag`.
    async fn public_key(&self, tag: &str) -> Result<Vec<u8>, SignatureError>;

    /// Signs `message` with ECDSA P-256 / SHA-256, returning `r || s`.
    async fn sign(&self, tag: &str, message: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Deletes the key under `tag`. Returns `false` if there was none.
    async fn delete_key(&self, tag: &str) -> Result<bool, SignatureError>;
}

/// In-memory [`SecureElement`].
///
/// Signatures are deterministic (RFC 6979).
#[derive(Default)]
pub struct SoftwareSecureElement {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl SoftwareSecureElement {
    /// Creates an empty key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Returns `true` if no key is stored.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

fn spki_der(key: &SigningKey) -> Result<Vec<u8>, SignatureError> {
    key.verifying_key()
        .to_public_key_der()
        .map(|der| der.as_bytes().to_vec())
        .map_err(|e| SignatureError::failed(format!("encode public key: {e}")))
}

#[async_trait]
impl SecureElement for SoftwareSecureElement {
    async fn generate_key(&self, tag: &str) -> Result<Vec<u8>, SignatureError> {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let public = spki_der(&key)?;
        self.keys.write().await.insert(tag.to_string(), key);
        tracing::debug!(tag, "secure element key generated");
        Ok(public)
    }

    async fn public_key(&self, tag: &str) -> Result<Vec<u8>, SignatureError> {
        let keys = self.keys.read().await;
        let key = keys
            .get(tag)
            .ok_or_else(|| SignatureError::KeyNotFound(tag.to_string()))?;
        spki_der(key)
    }

    async fn sign(&self, tag: &str, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let keys = self.keys.read().await;
        let key = keys
            .get(tag)
            .ok_or_else(|| SignatureError::KeyNotFound(tag.to_string()))?;
        let signature: Signature = key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }

    async fn delete_key(&self, tag: &str) -> Result<bool, SignatureError> {
        Ok(self.keys.write().await.remove(tag).is_some())
    }
}

/// `ES256` signer backed by one [`SecureElement`] key.
#[derive(Clone)]
pub struct SecureElementSigner {
    element: Arc<dyn SecureElement>,
    tag: String,
}

impl SecureElementSigner {
    /// Signs with the key stored under `tag`.
    #[must_use]
    pub fn new(element: Arc<dyn SecureElement>, tag: impl Into<String>) -> Self {
        Self {
            element,
            tag: tag.into(),
        }
    }

    /// The key tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

#[async_trait]
impl JwtSigner for SecureElementSigner {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Es256
    }

    fn certificates(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        self.element.sign(&self.tag, message).await
    }
}
