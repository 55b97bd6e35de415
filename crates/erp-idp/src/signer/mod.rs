//! The signer capability.
//!
//! A [`JwtSigner`] produces raw `r || s` ECDSA signatures. Three kinds of
//! keys are supported:
//!
//! - [`BrainpoolP256r1Signer`] - a software brainpoolP256r1 key with its certificate
//! - [`SecureElementSigner`] - a P-256 key held by a [`SecureElement`]
//! - [`SmartcardSigner`] - the authentication key of a [`HealthCard`]
//!
//! [`TimeoutSigner`] bounds any of them in time.

mod secure_element;
mod smartcard;
mod software;

use std::time::Duration;

use async_trait::async_trait;

use crate::jwt::Algorithm;

pub use secure_element::{SecureElement, SecureElementSigner, SoftwareSecureElement};
pub use smartcard::{HealthCard, SimulatedHealthCard, SmartcardSigner};
pub use software::BrainpoolP256r1Signer;

/// Signer failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The PIN was rejected.
    #[error("Wrong PIN, {retries_left} attempts left")]
    WrongPin {
        /// Remaining attempts before the PIN is blocked.
        retries_left: u8,
    },

    /// The PIN is blocked.
    #[error("PIN blocked")]
    PinBlocked,

    /// The card was removed during the operation.
    #[error("Card removed")]
    CardRemoved,

    /// The signer did not answer in time.
    #[error("Signing timed out after {0:?}")]
    Timeout(Duration),

    /// The user or the host aborted the operation.
    #[error("Signing cancelled")]
    Cancelled,

    /// No key is stored under the requested identifier.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Key or certificate material is unusable.
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Any other signer failure.
    #[error("Signing failed: {0}")]
    Failed(String),
}

impl SignatureError {
    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Creates a new `Failed` error.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Remaining PIN attempts, if the PIN was wrong.
    #[must_use]
    pub fn retries_left(&self) -> Option<u8> {
        match self {
            Self::WrongPin { retries_left } => Some(*retries_left),
            _ => None,
        }
    }

    /// Returns `true` if the user can try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WrongPin { .. } | Self::CardRemoved | Self::Timeout(_) | Self::Cancelled
        )
    }
}

impl From<openssl::error::ErrorStack> for SignatureError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Signs JWTs.
#[async_trait]
pub trait JwtSigner: Send + Sync {
    /// The algorithm of the produced signatures.
    fn algorithm(&self) -> Algorithm;

    /// DER certificates for the `x5c` header, leaf first. May be empty.
    fn certificates(&self) -> Vec<Vec<u8>>;

    /// Signs `message`, returning a raw `r || s` signature.
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError>;
}

/// Bounds another signer in time.
///
/// Signing that does not finish within `timeout` fails with
/// `SignatureError::Timeout`; the pending operation is dropped.
pub struct TimeoutSigner<'a> {
    inner: &'a dyn JwtSigner,
    timeout: Duration,
}

impl<'a> TimeoutSigner<'a> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: &'a dyn JwtSigner, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl JwtSigner for TimeoutSigner<'_> {
    fn algorithm(&self) -> Algorithm {
        self.inner.algorithm()
    }

    fn certificates(&self) -> Vec<Vec<u8>> {
        self.inner.certificates()
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        tokio::time::timeout(self.timeout, self.inner.sign(message))
            .await
            .map_err(|_| SignatureError::Timeout(self.timeout))?
    }
}
