//! External authentication through insurer apps.

use serde::{Deserialize, Serialize};

use crate::pkce::PkceVerifier;

/// An insurer app that can authenticate the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KkAppEntry {
    /// Display name.
    #[serde(rename = "kk_app_name")]
    pub name: String,
    /// Identifier sent to the IDP.
    #[serde(rename = "kk_app_id")]
    pub identifier: String,
}

/// The signed directory of insurer apps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KkAppDirectory {
    /// Available apps.
    #[serde(rename = "kk_app_list", default)]
    pub apps: Vec<KkAppEntry>,
}

/// A pending external authentication, persisted until the insurer app returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtAuthChallengeSession {
    /// `state` sent with the request; also the storage key.
    pub state: String,
    /// PKCE verifier for the code exchange.
    pub verifier_code: PkceVerifier,
    /// `nonce` expected in the ID token.
    pub nonce: String,
    /// The chosen insurer app.
    pub entry: KkAppEntry,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_directory_wire_format() {
        let directory: KkAppDirectory = serde_json::from_value(json!({
            "kk_app_list": [
                {"kk_app_name": "Gematik KK", "kk_app_id": "kkAppId001"},
                {"kk_app_name": "Other KK", "kk_app_id": "kkAppId002"}
            ]
        }))
        .unwrap();
        assert_eq!(directory.apps.len(), 2);
        assert_eq!(directory.apps[0].identifier, "kkAppId001");
    }

    #[test]
    fn test_session_round_trips_through_storage_format() {
        let session = ExtAuthChallengeSession {
            state: "abc".to_string(),
            verifier_code: PkceVerifier::generate(),
            nonce: "n".to_string(),
            entry: KkAppEntry {
                name: "Gematik KK".to_string(),
                identifier: "kkAppId001".to_string(),
            },
        };
        let json = serde_json::to_string(&session).unwrap();
        assert_eq!(
            serde_json::from_str::<ExtAuthChallengeSession>(&json).unwrap(),
            session
        );
    }
}
