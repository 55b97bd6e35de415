//! PKCE (RFC 7636, S256) and per-attempt random values.
//!
//! The client sends `code_challenge = BASE64URL(SHA256(code_verifier))` with
//! the challenge request and proves possession with the verifier at the
//! token endpoint.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The only supported challenge method.
pub const CHALLENGE_METHOD: &str = "S256";

/// Accepted verifier lengths.
const VERIFIER_LEN: std::ops::RangeInclusive<usize> = 43..=128;

/// PKCE errors.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside 43..=128.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters other than `[A-Za-z0-9-._~]`.
    #[error("Invalid verifier characters")]
    InvalidVerifierCharacters,
}

// =============================================================================
// Verifier
// =============================================================================

/// PKCE code verifier.
///
/// Persisted with pending external authentication requests, hence
/// serializable. `Debug` does not print the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Wraps an existing verifier.
    ///
    /// # Errors
    ///
    /// Returns an error for the wrong length or characters.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        if !VERIFIER_LEN.contains(&verifier.len()) {
            return Err(PkceError::InvalidVerifierLength(verifier.len()));
        }
        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(verifier))
    }

    /// 32 random bytes, base64url encoded (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The S256 challenge for this verifier.
    #[must_use]
    pub fn challenge(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(self.0.as_bytes()))
    }

    /// Returns `true` if `challenge` was derived from this verifier.
    #[must_use]
    pub fn matches(&self, challenge: &str) -> bool {
        self.challenge() == challenge
    }

    /// The verifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PkceVerifier(..)")
    }
}

impl TryFrom<String> for PkceVerifier {
    type Error = PkceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PkceVerifier> for String {
    fn from(verifier: PkceVerifier) -> Self {
        verifier.0
    }
}

/// A random hex value for `state` and `nonce`.
#[must_use]
pub fn random_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_vector() {
        // RFC 7636, Appendix B.
        let verifier =
            PkceVerifier::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string()).unwrap();
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(verifier.matches("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
    }

    #[test]
    fn test_generate() {
        let a = PkceVerifier::generate();
        let b = PkceVerifier::generate();
        assert_eq!(a.as_str().len(), 43);
        assert_ne!(a, b);
        assert!(PkceVerifier::new(a.as_str().to_string()).is_ok());
    }

    #[test]
    fn test_invalid_verifiers() {
        assert!(matches!(
            PkceVerifier::new("short".to_string()),
            Err(PkceError::InvalidVerifierLength(5))
        ));
        assert!(matches!(
            PkceVerifier::new("a".repeat(42) + "!"),
            Err(PkceError::InvalidVerifierCharacters)
        ));
    }

    #[test]
    fn test_serde_validates() {
        let verifier = PkceVerifier::generate();
        let json = serde_json::to_string(&verifier).unwrap();
        assert_eq!(serde_json::from_str::<PkceVerifier>(&json).unwrap(), verifier);
        assert!(serde_json::from_str::<PkceVerifier>(r#""short""#).is_err());
    }

    #[test]
    fn test_debug_hides_value() {
        let verifier = PkceVerifier::generate();
        assert!(!format!("{verifier:?}").contains(verifier.as_str()));
    }

    #[test]
    fn test_random_token() {
        let token = random_token();
        assert_eq!(token.len(), 32);
        assert_ne!(token, random_token());
    }
}
