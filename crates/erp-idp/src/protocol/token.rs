//! Tokens and the code redirect.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// The result of a successful signed challenge submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeToken {
    /// Authorization code.
    pub code: String,
    /// SSO token, if the IDP issued one.
    pub sso_token: Option<String>,
    /// Echoed `state`.
    pub state: String,
    /// The full redirect location.
    pub redirect: Url,
}

/// Token endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token for the eRx backend.
    pub access_token: String,
    /// Signed ID token.
    pub id_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Usually `Bearer`.
    pub token_type: String,
}

/// Claims read from the ID token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Nonce from the challenge request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Insurant id (KVNR).
    #[serde(default, rename = "idNummer", skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Insurer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    /// Authentication context class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    /// Authentication methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amr: Vec<String>,
    /// Expiry, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// The token set kept for a session.
///
/// `Debug` redacts token values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpToken {
    /// Access token.
    pub access_token: String,
    /// Signed ID token.
    pub id_token: String,
    /// SSO token used for refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso_token: Option<String>,
    /// Access token expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    /// Token type.
    pub token_type: String,
}

impl IdpToken {
    /// Returns `true` if the access token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }

    /// Returns `true` if the access token is expired now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Remaining lifetime, zero once expired.
    #[must_use]
    pub fn expires_in(&self) -> std::time::Duration {
        let remaining = self.expires - OffsetDateTime::now_utc();
        remaining.try_into().unwrap_or_default()
    }
}

impl fmt::Debug for IdpToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdpToken")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &"[REDACTED]")
            .field("sso_token", &self.sso_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires", &self.expires)
            .field("token_type", &self.token_type)
            .finish()
    }
}
