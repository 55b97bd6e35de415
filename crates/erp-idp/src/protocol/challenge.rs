//! Authentication challenges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::jwt::{Jwt, JwtError};
use crate::pkce::PkceVerifier;

/// Body of the challenge endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// The signed challenge token.
    pub challenge: Jwt,
    /// Scopes and claims the user is asked to release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_consent: Option<UserConsent>,
}

/// Consent information shown before signing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConsent {
    /// Scope name to description.
    #[serde(default)]
    pub requested_scopes: BTreeMap<String, String>,
    /// Claim name to description.
    #[serde(default)]
    pub requested_claims: BTreeMap<String, String>,
}

/// Claims of a challenge token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiry.
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    /// Issue time.
    #[serde(
        default,
        with = "time::serde::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<OffsetDateTime>,
    /// Echo of the requested `state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Echo of the requested `nonce`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Echo of the PKCE challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// Echo of the requested scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Echo of the client id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Token type, `challenge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// A verified challenge with its decoded claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpChallenge {
    jwt: Jwt,
    claims: ChallengeClaims,
    consent: Option<UserConsent>,
}

impl IdpChallenge {
    /// Decodes the claims of `jwt`.
    ///
    /// Signature verification is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Payload` if the claims cannot be decoded.
    pub fn new(jwt: Jwt, consent: Option<UserConsent>) -> Result<Self, JwtError> {
        let claims = jwt.decode_payload()?;
        Ok(Self {
            jwt,
            claims,
            consent,
        })
    }

    /// The challenge token as received.
    #[must_use]
    pub fn jwt(&self) -> &Jwt {
        &self.jwt
    }

    /// Decoded claims.
    #[must_use]
    pub fn claims(&self) -> &ChallengeClaims {
        &self.claims
    }

    /// Consent information, if the IDP sent any.
    #[must_use]
    pub fn consent(&self) -> Option<&UserConsent> {
        self.consent.as_ref()
    }

    /// Expiry of the challenge.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.claims.exp
    }
}

/// One authentication attempt: the challenge plus the client secrets bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpChallengeSession {
    /// The verified challenge.
    pub challenge: IdpChallenge,
    /// PKCE verifier for the code exchange.
    pub verifier_code: PkceVerifier,
    /// `state` sent with the request.
    pub state: String,
    /// `nonce` expected in the ID token.
    pub nonce: String,
}

impl IdpChallengeSession {
    /// Returns `true` if the challenge has expired at `now`, allowing `skew`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime, skew: std::time::Duration) -> bool {
        self.challenge.expires_at() + skew <= now
    }
}

/// Payload of the nested JWT that wraps a challenge for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedChallenge {
    /// The compact challenge token.
    pub njwt: String,
}

/// A challenge signed by the user's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedChallenge {
    /// The attempt this signature belongs to.
    pub original_challenge: IdpChallengeSession,
    /// `{"njwt": challenge}` signed with the user's key, certificate in `x5c`.
    pub signed_challenge: Jwt,
}
