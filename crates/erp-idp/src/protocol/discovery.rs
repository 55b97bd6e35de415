//! Discovery document and IDP signing key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

/// Endpoints and keys announced by the IDP.
///
/// Served as a signed JWT; this is its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier.
    pub issuer: Url,
    /// Challenge request (GET) and signed challenge submission (POST).
    pub authorization_endpoint: Url,
    /// SSO token based re-authentication.
    pub sso_endpoint: Url,
    /// Code exchange.
    pub token_endpoint: Url,
    /// Authentication with a paired device key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_pair_endpoint: Option<Url>,
    /// Pairing registration, listing and removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_pair: Option<Url>,
    /// JWK of the key that signs challenges and tokens.
    pub uri_puk_idp_sig: Url,
    /// Signed directory of insurer apps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kk_app_list_uri: Option<Url>,
    /// External (insurer app) authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_party_authorization_endpoint: Option<Url>,
    /// Supported scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    /// Expiry of this document.
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
    /// Issue time.
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
}

/// A JSON Web Key with its certificate chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Key type, `EC`.
    pub kty: String,
    /// Curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Intended use, `sig`.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Standard base64 DER certificates, leaf first.
    #[serde(default)]
    pub x5c: Vec<String>,
}

impl Jwk {
    /// Builds a key entry for a DER certificate.
    #[must_use]
    pub fn from_certificate(kid: impl Into<String>, der: &[u8]) -> Self {
        Self {
            kid: Some(kid.into()),
            kty: "EC".to_string(),
            crv: Some("BP-256".to_string()),
            key_use: Some("sig".to_string()),
            x5c: vec![STANDARD.encode(der)],
        }
    }

    /// The DER leaf certificate, if present and valid base64.
    #[must_use]
    pub fn leaf_certificate(&self) -> Option<Vec<u8>> {
        self.x5c
            .first()
            .and_then(|entry| STANDARD.decode(entry).ok())
    }
}
