//! IDP session protocol for the eRx client.
//!
//! An [`IdpSession`] drives authentication against the identity provider:
//!
//! - discovery: a signed discovery document and the IDP signing key,
//!   both checked against the [`TrustStoreSession`](erp_truststore::TrustStoreSession)
//! - challenge: a PKCE protected authorization challenge
//! - sign: the challenge wrapped in a nested JWT and signed by a [`JwtSigner`]
//! - verify: the signed challenge exchanged for an authorization code
//! - exchange: the code exchanged for an [`IdpToken`]
//!
//! Tokens are refreshed with the SSO token, devices can be paired for
//! authentication with a device key, and insurer apps can authenticate
//! the user through external authentication.
//!
//! # Example
//!
//! ```ignore
//! use erp_idp::{IdpSession, IdpSessionConfig, MemoryStore};
//!
//! let store = MemoryStore::new().default_profile();
//! let session = IdpSession::new(config, http, trust_store, Arc::new(store.clone()), Arc::new(store))?;
//!
//! let challenge = session.request_challenge().await?;
//! let signed = session.sign(challenge, &card, &[]).await?;
//! let token = session.verify_and_exchange(signed).await?;
//! ```

pub mod config;
pub mod error;
pub mod jwt;
pub mod pairing;
pub mod pkce;
pub mod protocol;
pub mod session;
pub mod signer;
pub mod storage;

pub use config::{ConfigError, IdpSessionConfig};
pub use error::{ErrorCategory, IdpError, IdpErrorKind, IdpErrorResponse, IdpResult, IdpStage};
pub use jwt::{Algorithm, Jwt, JwtError, JwtHeader, JwtVerifier};
pub use pairing::PairingSignatureProvider;
pub use pkce::PkceVerifier;
pub use protocol::{
    DiscoveryDocument, ExchangeToken, ExtAuthChallengeSession, IdpChallenge, IdpChallengeSession,
    IdpToken, KkAppDirectory, KkAppEntry, PairingEntries, PairingEntry, RegistrationData,
    SignedAuthenticationData, SignedChallenge,
};
pub use session::{IdpSession, SessionPhase};
pub use signer::{
    BrainpoolP256r1Signer, HealthCard, JwtSigner, SecureElement, SecureElementSigner,
    SignatureError, SimulatedHealthCard, SmartcardSigner, SoftwareSecureElement,
};
pub use storage::{
    ExtAuthRequestStorage, MemoryStore, PairingRecord, PairingStorage, ProfileStore, StorageError,
    TokenStorage,
};
