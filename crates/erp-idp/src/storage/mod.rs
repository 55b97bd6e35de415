//! Persistence contracts.
//!
//! The session persists three things: the token set, pending external
//! authentication requests and the device pairing. Hosts provide storage
//! by implementing the traits here; [`MemoryStore`] is the in-process
//! implementation.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::protocol::{ExtAuthChallengeSession, IdpToken};

pub use memory::{MemoryStore, ProfileStore};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend failed to read or write.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored data could not be encoded or decoded.
    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}

/// Holds the current token set.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// The stored token, if any.
    async fn token(&self) -> Result<Option<IdpToken>, StorageError>;

    /// Replaces the stored token.
    async fn set_token(&self, token: IdpToken) -> Result<(), StorageError>;

    /// Removes the stored token.
    async fn clear_token(&self) -> Result<(), StorageError>;
}

/// Holds pending external authentication requests, keyed by `state`.
#[async_trait]
pub trait ExtAuthRequestStorage: Send + Sync {
    /// The request stored under `state`.
    async fn ext_auth_request(
        &self,
        state: &str,
    ) -> Result<Option<ExtAuthChallengeSession>, StorageError>;

    /// Stores `request` under its `state`.
    async fn set_ext_auth_request(
        &self,
        request: ExtAuthChallengeSession,
    ) -> Result<(), StorageError>;

    /// Removes the request stored under `state`.
    async fn remove_ext_auth_request(&self, state: &str) -> Result<(), StorageError>;

    /// All pending requests.
    async fn pending_ext_auth_requests(&self) -> Result<Vec<ExtAuthChallengeSession>, StorageError>;
}

/// The device side of a pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRecord {
    /// Secure element tag of the device key.
    pub key_tag: String,
    /// Identifier registered with the IDP.
    pub key_identifier: String,
    /// DER health card authentication certificate.
    #[serde(with = "base64_bytes")]
    pub auth_certificate: Vec<u8>,
}

/// Holds the device pairing.
#[async_trait]
pub trait PairingStorage: Send + Sync {
    /// The stored pairing, if any.
    async fn pairing(&self) -> Result<Option<PairingRecord>, StorageError>;

    /// Replaces the stored pairing.
    async fn set_pairing(&self, record: PairingRecord) -> Result<(), StorageError>;

    /// Removes the stored pairing.
    async fn clear_pairing(&self) -> Result<(), StorageError>;
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}
