//! Compact JWT codec.
//!
//! A [`Jwt`] keeps the exact base64url segments it was parsed from, so that
//! signatures are always checked over the bytes the issuer signed and
//! re-serialization is byte exact.
//!
//! ```ignore
//! let jwt = Jwt::new(JwtHeader::new(Algorithm::Bp256r1), &claims)?;
//! let signed = jwt.sign(&signer).await?;
//! assert!(Jwt::parse(&signed.serialize())?.verify(&verifier)?);
//! ```

mod verifier;

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::signer::{JwtSigner, SignatureError};

pub use verifier::{BrainpoolP256r1Verifier, Es256Verifier, JwtVerifier, verifier_for_certificate};

// =============================================================================
// Errors
// =============================================================================

/// JWT codec errors.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Wrong number of segments, an empty segment or characters outside
    /// the base64url alphabet.
    #[error("Malformed JWT")]
    Malformed,

    /// A segment is not valid unpadded base64url.
    #[error("Invalid base64url encoding in JWT")]
    Encoding,

    /// The header is not a JSON object of the expected shape.
    #[error("Invalid JWT header: {0}")]
    Header(#[source] serde_json::Error),

    /// The payload does not decode into the requested claims type.
    #[error("Invalid JWT payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// Header or claims could not be serialized.
    #[error("Failed to serialize JWT: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Verification was requested on an unsigned token.
    #[error("JWT has no signature")]
    NoSignature,

    /// The signature is not a raw `r || s` pair of the expected size.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// The key or certificate uses an algorithm this codec does not support.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material could not be processed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The signer failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl From<openssl::error::ErrorStack> for JwtError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Crypto(err.to_string())
    }
}

// =============================================================================
// Header
// =============================================================================

/// Signature algorithm named in the JWT header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Unsigned.
    #[serde(rename = "none")]
    None,
    /// ECDSA over brainpoolP256r1 with SHA-256.
    #[serde(rename = "BP256R1")]
    Bp256r1,
    /// ECDSA over P-256 with SHA-256.
    #[serde(rename = "ES256")]
    Es256,
}

impl Algorithm {
    /// The registered `alg` value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bp256r1 => "BP256R1",
            Self::Es256 => "ES256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JOSE header.
///
/// `x5c` entries are DER certificates, encoded as standard (padded) base64
/// on the wire. Unknown header members are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signature algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<Algorithm>,
    /// Certificate chain, leaf first.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "x5c")]
    pub x5c: Option<Vec<Vec<u8>>>,
    /// Token type, usually `JWT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    /// Content type, `NJWT` for nested tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
    /// Key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl JwtHeader {
    /// Creates a `typ: JWT` header for `alg`.
    #[must_use]
    pub fn new(alg: Algorithm) -> Self {
        Self {
            alg: Some(alg),
            typ: Some("JWT".to_string()),
            ..Self::default()
        }
    }

    /// Sets the certificate chain.
    #[must_use]
    pub fn with_x5c(mut self, certificates: Vec<Vec<u8>>) -> Self {
        self.x5c = Some(certificates);
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_cty(mut self, cty: impl Into<String>) -> Self {
        self.cty = Some(cty.into());
        self
    }

    /// Sets the key identifier.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// The algorithm, `none` if absent.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.alg.unwrap_or(Algorithm::None)
    }

    /// The leaf certificate of `x5c`, if any.
    #[must_use]
    pub fn leaf_certificate(&self) -> Option<&[u8]> {
        self.x5c.as_ref()?.first().map(Vec::as_slice)
    }
}

mod x5c {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<Vec<u8>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(certificates) => {
                serializer.collect_seq(certificates.iter().map(|der| STANDARD.encode(der)))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Vec<u8>>>, D::Error> {
        let encoded: Option<Vec<String>> = Option::deserialize(deserializer)?;
        encoded
            .map(|certificates| {
                certificates
                    .iter()
                    .map(|entry| STANDARD.decode(entry).map_err(D::Error::custom))
                    .collect()
            })
            .transpose()
    }
}

// =============================================================================
// Token
// =============================================================================

/// A compact serialized JWT, optionally signed.
#[derive(Clone)]
pub struct Jwt {
    header: JwtHeader,
    raw_header: String,
    raw_payload: String,
    raw_signature: Option<String>,
    signature: Option<Vec<u8>>,
}

fn is_base64url(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'
}

impl Jwt {
    /// Builds an unsigned token from a header and claims.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Serialization` if either part fails to serialize.
    pub fn new<C: Serialize>(header: JwtHeader, claims: &C) -> Result<Self, JwtError> {
        let header_json = serde_json::to_vec(&header).map_err(JwtError::Serialization)?;
        let payload_json = serde_json::to_vec(claims).map_err(JwtError::Serialization)?;
        Ok(Self {
            header,
            raw_header: URL_SAFE_NO_PAD.encode(header_json),
            raw_payload: URL_SAFE_NO_PAD.encode(payload_json),
            raw_signature: None,
            signature: None,
        })
    }

    /// Parses `header.payload` or `header.payload.signature`.
    ///
    /// The payload is only checked for valid base64url here; use
    /// [`decode_payload`](Self::decode_payload) to read claims.
    ///
    /// # Errors
    ///
    /// - `JwtError::Malformed` for the wrong segment count, an empty segment
    ///   or non base64url characters
    /// - `JwtError::Encoding` if a segment does not decode
    /// - `JwtError::Header` if the header is not valid JSON
    pub fn parse(input: &str) -> Result<Self, JwtError> {
        let segments: Vec<&str> = input.split('.').collect();
        let (raw_header, raw_payload, raw_signature) = match segments.as_slice() {
            [header, payload] => (*header, *payload, None),
            [header, payload, signature] => (*header, *payload, Some(*signature)),
            _ => return Err(JwtError::Malformed),
        };

        let well_formed = [raw_header, raw_payload]
            .into_iter()
            .chain(raw_signature)
            .all(|segment| !segment.is_empty() && segment.bytes().all(is_base64url));
        if !well_formed {
            return Err(JwtError::Malformed);
        }

        let header_json = URL_SAFE_NO_PAD
            .decode(raw_header)
            .map_err(|_| JwtError::Encoding)?;
        URL_SAFE_NO_PAD
            .decode(raw_payload)
            .map_err(|_| JwtError::Encoding)?;
        let signature = raw_signature
            .map(|segment| URL_SAFE_NO_PAD.decode(segment))
            .transpose()
            .map_err(|_| JwtError::Encoding)?;
        let header = serde_json::from_slice(&header_json).map_err(JwtError::Header)?;

        Ok(Self {
            header,
            raw_header: raw_header.to_string(),
            raw_payload: raw_payload.to_string(),
            raw_signature: raw_signature.map(str::to_string),
            signature,
        })
    }

    /// The decoded header.
    #[must_use]
    pub fn header(&self) -> &JwtHeader {
        &self.header
    }

    /// The raw signature bytes, if signed.
    #[must_use]
    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// Returns `true` if the token carries a signature segment.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// The bytes covered by the signature: `header.payload`.
    #[must_use]
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.raw_header, self.raw_payload)
    }

    /// Decodes the payload into `C`.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Payload` if the payload does not match `C`.
    pub fn decode_payload<C: DeserializeOwned>(&self) -> Result<C, JwtError> {
        let json = URL_SAFE_NO_PAD
            .decode(&self.raw_payload)
            .map_err(|_| JwtError::Encoding)?;
        serde_json::from_slice(&json).map_err(JwtError::Payload)
    }

    /// Signs `header.payload` with `signer`, replacing any existing signature.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Signature` if the signer fails.
    pub async fn sign(&self, signer: &dyn JwtSigner) -> Result<Self, JwtError> {
        let signature = signer.sign(self.signing_input().as_bytes()).await?;
        if signature.is_empty() {
            return Err(SignatureError::failed("signer returned an empty signature").into());
        }
        Ok(Self {
            header: self.header.clone(),
            raw_header: self.raw_header.clone(),
            raw_payload: self.raw_payload.clone(),
            raw_signature: Some(URL_SAFE_NO_PAD.encode(&signature)),
            signature: Some(signature),
        })
    }

    /// Verifies the signature over `header.payload`.
    ///
    /// A signature that does not match returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `JwtError::NoSignature` if the token is unsigned
    /// - `JwtError::MalformedSignature` if the signature has the wrong size
    pub fn verify(&self, verifier: &dyn JwtVerifier) -> Result<bool, JwtError> {
        let signature = self.signature.as_deref().ok_or(JwtError::NoSignature)?;
        verifier.verify(signature, self.signing_input().as_bytes())
    }

    /// The compact serialization, byte identical to the parsed input.
    #[must_use]
    pub fn serialize(&self) -> String {
        match &self.raw_signature {
            Some(signature) => format!("{}.{}.{}", self.raw_header, self.raw_payload, signature),
            None => self.signing_input(),
        }
    }
}

impl PartialEq for Jwt {
    fn eq(&self, other: &Self) -> bool {
        self.raw_header == other.raw_header
            && self.raw_payload == other.raw_payload
            && self.raw_signature == other.raw_signature
    }
}

impl Eq for Jwt {}

impl fmt::Debug for Jwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwt")
            .field("header", &self.header)
            .field("payload_len", &self.raw_payload.len())
            .field("signed", &self.is_signed())
            .finish()
    }
}

impl fmt::Display for Jwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for Jwt {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Jwt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Jwt::serialize(self))
    }
}

impl<'de> Deserialize<'de> for Jwt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let compact = String::deserialize(deserializer)?;
        Self::parse(&compact).map_err(serde::de::Error::custom)
    }
}
