//! Error types for the IDP session.
//!
//! Every failure surfaced by [`IdpSession`](crate::IdpSession) is an
//! [`IdpError`]: the protocol stage that failed plus an [`IdpErrorKind`]
//! describing what went wrong. Callers branch on [`ErrorCategory`] rather
//! than on individual variants.

use std::fmt;

use erp_httpclient::HttpError;
use erp_truststore::TrustStoreError;
use serde::{Deserialize, Serialize};

use crate::jwt::JwtError;
use crate::signer::SignatureError;
use crate::storage::StorageError;

// =============================================================================
// Stage
// =============================================================================

/// The protocol stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdpStage {
    /// Loading or verifying the discovery document and IDP signing key.
    Discovery,
    /// Requesting an authentication challenge.
    Challenge,
    /// Signing a challenge or authentication data locally.
    Sign,
    /// Posting signed material and receiving the code redirect.
    Verify,
    /// Exchanging an authorization code for tokens.
    Exchange,
    /// Renewing tokens with the SSO token.
    Refresh,
    /// Device pairing and pairing management.
    Pairing,
    /// Authentication through an insurer app.
    ExternalAuth,
    /// Reading or discarding the stored token.
    Token,
}

impl fmt::Display for IdpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::Challenge => "challenge",
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Exchange => "exchange",
            Self::Refresh => "refresh",
            Self::Pairing => "pairing",
            Self::ExternalAuth => "external authentication",
            Self::Token => "token",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Category
// =============================================================================

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No usable response, or an HTTP error status.
    Transport,
    /// A response or token could not be decoded.
    MalformedData,
    /// A server certificate did not validate, or trust material was unavailable.
    Trust,
    /// A signature could not be produced or did not verify.
    Signature,
    /// The call does not fit the current session state.
    SessionState,
    /// Persistent storage failed.
    Storage,
    /// The session is misconfigured.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::MalformedData => "malformed_data",
            Self::Trust => "trust",
            Self::Signature => "signature",
            Self::SessionState => "session_state",
            Self::Storage => "storage",
            Self::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Server error body
// =============================================================================

/// Error body returned by the IDP, either as JSON or as redirect query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpErrorResponse {
    /// OAuth error code.
    #[serde(default)]
    pub error: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Vendor error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gematik_code: Option<String>,
    /// Vendor error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gematik_error_text: Option<String>,
}

impl fmt::Display for IdpErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)?;
        if let Some(code) = &self.gematik_code {
            write!(f, " ({code})")?;
        }
        if let Some(text) = self.gematik_error_text.as_ref().or(self.error_description.as_ref()) {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Error kind
// =============================================================================

/// What went wrong.
#[derive(Debug, thiserror::Error)]
pub enum IdpErrorKind {
    /// The request could not be sent or no response arrived.
    #[error(transparent)]
    Transport(#[from] HttpError),

    /// The IDP answered with an error status or error redirect.
    #[error("IDP returned HTTP {status}{}", .error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Decoded error body, if any.
        error: Option<IdpErrorResponse>,
    },

    /// The response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decoding(String),

    /// A JWT could not be parsed or built.
    #[error(transparent)]
    Jwt(JwtError),

    /// The server presented a JWT without an `x5c` certificate.
    #[error("Token carries no certificate")]
    MissingCertificate,

    /// Local certificate or key material could not be processed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Trust material was unavailable or a certificate could not be checked.
    #[error(transparent)]
    Trust(#[from] TrustStoreError),

    /// A server certificate does not chain to a trust anchor.
    #[error("Untrusted certificate: {0}")]
    UntrustedCertificate(String),

    /// A server signature did not verify.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The local signer failed.
    #[error(transparent)]
    Signer(#[from] SignatureError),

    /// The ID token nonce does not match the one sent with the challenge.
    #[error("Nonce mismatch")]
    NonceMismatch,

    /// The returned `state` does not match the pending attempt.
    #[error("State mismatch")]
    StateMismatch,

    /// The challenge is not the pending attempt, or was already used.
    #[error("No pending challenge for this attempt")]
    NoPendingChallenge,

    /// The challenge expired before it was submitted.
    #[error("Challenge expired")]
    ChallengeExpired,

    /// The IDP issued a token that is already expired.
    #[error("Token expired")]
    TokenExpired,

    /// No token is stored.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The stored token cannot be refreshed.
    #[error("Token has no SSO token")]
    MissingSsoToken,

    /// No pairing is stored on this device.
    #[error("Device is not paired")]
    NotPaired,

    /// No external authentication request is stored for `state`.
    #[error("No external authentication request for state {0}")]
    ExtAuthRequestNotFound(String),

    /// The universal link is not an external authentication callback.
    #[error("Invalid universal link: {0}")]
    InvalidUniversalLink(String),

    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The discovery document lacks an endpoint the operation needs.
    #[error("Discovery document has no {0}")]
    MissingEndpoint(&'static str),

    /// The session is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IdpErrorKind {
    /// Creates a new `UnexpectedResponse` error.
    #[must_use]
    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// Creates a new `Decoding` error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Tags this error with the stage it occurred in.
    #[must_use]
    pub fn at(self, stage: IdpStage) -> IdpError {
        IdpError::new(stage, self)
    }

    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::ServerError { .. } => ErrorCategory::Transport,
            Self::UnexpectedResponse(_)
            | Self::Decoding(_)
            | Self::MissingCertificate
            | Self::Crypto(_)
            | Self::InvalidUniversalLink(_) => ErrorCategory::MalformedData,
            Self::Jwt(_) => ErrorCategory::MalformedData,
            Self::Trust(err) if err.is_malformed_data() => ErrorCategory::MalformedData,
            Self::Trust(_) | Self::UntrustedCertificate(_) => ErrorCategory::Trust,
            Self::InvalidSignature | Self::Signer(_) | Self::NonceMismatch => {
                ErrorCategory::Signature
            }
            Self::StateMismatch
            | Self::NoPendingChallenge
            | Self::ChallengeExpired
            | Self::TokenExpired
            | Self::NotAuthenticated
            | Self::MissingSsoToken
            | Self::NotPaired
            | Self::ExtAuthRequestNotFound(_) => ErrorCategory::SessionState,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::MissingEndpoint(_) | Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Returns `true` if no response was received at all.
    ///
    /// A failed refresh only keeps the stored token for this case.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_connection_error(),
            Self::Trust(TrustStoreError::Fetch { source, .. }) => source.is_connection_error(),
            _ => false,
        }
    }

    /// Returns `true` if repeating the same call may succeed.
    ///
    /// Covers connection failures, IDP 5xx answers, failed trust material
    /// fetches and signer failures the user can resolve, such as a wrong
    /// PIN. Trust rejections and remote signature failures never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServerError { status, .. } => *status >= 500,
            Self::Transport(err) => err.is_connection_error(),
            Self::Trust(err) => err.is_fetch_error(),
            Self::Signer(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<JwtError> for IdpErrorKind {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Signature(err) => Self::Signer(err),
            other => Self::Jwt(other),
        }
    }
}

// =============================================================================
// Error
// =============================================================================

/// An IDP session failure tagged with its stage.
#[derive(Debug)]
pub struct IdpError {
    stage: IdpStage,
    kind: IdpErrorKind,
}

impl IdpError {
    /// Creates a new error.
    #[must_use]
    pub fn new(stage: IdpStage, kind: IdpErrorKind) -> Self {
        Self { stage, kind }
    }

    /// The stage that failed.
    #[must_use]
    pub fn stage(&self) -> IdpStage {
        self.stage
    }

    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> &IdpErrorKind {
        &self.kind
    }

    /// Consumes the error, returning its kind.
    #[must_use]
    pub fn into_kind(self) -> IdpErrorKind {
        self.kind
    }

    /// Shorthand for `self.kind().category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Shorthand for `self.kind().is_retryable()`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for IdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.kind)
    }
}

impl std::error::Error for IdpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Result type for IDP session operations.
pub type IdpResult<T> = Result<T, IdpError>;
