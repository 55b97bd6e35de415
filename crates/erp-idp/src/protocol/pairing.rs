//! Device pairing messages.
//!
//! Pairing binds a device key (held by a secure element) to the user's
//! health card certificate. Afterwards the device key alone can answer
//! challenges ("alternative authentication").

use serde::{Deserialize, Serialize};

use super::challenge::IdpChallengeSession;
use crate::jwt::Jwt;

/// Version tag of the pairing and authentication data formats.
pub const DATA_VERSION: &str = "1.0";

/// The device being paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInformation {
    /// User visible device name.
    pub name: String,
    /// Hardware and OS details.
    pub device_type: DeviceType,
}

/// Hardware and OS details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceType {
    /// Product name.
    pub product: String,
    /// Model identifier.
    pub model: String,
    /// Operating system.
    pub os: String,
    /// Operating system version.
    pub os_version: String,
    /// Manufacturer.
    pub manufacturer: String,
}

/// Claims of the pairing data JWT, signed with the health card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingData {
    /// Format version.
    pub pairing_data_version: String,
    /// Identifier of the device key.
    pub key_identifier: String,
    /// Device product name.
    pub device_product: String,
    /// Serial number of the card certificate (hex).
    pub serialnumber: String,
    /// Issuer common name of the card certificate.
    pub issuer: String,
    /// Card certificate expiry, seconds since the epoch.
    pub not_after: i64,
    /// Device public key: base64url DER `SubjectPublicKeyInfo`.
    pub public_key: String,
}

/// What is posted to register a pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationData {
    /// Pairing data signed with the health card key.
    pub signed_pairing_data: Jwt,
    /// Card authentication certificate, base64url DER.
    pub auth_cert: String,
    /// The device.
    pub device_information: DeviceInformation,
}

/// An in-progress pairing: a freshly generated device key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSession {
    /// Secure element tag of the device key.
    pub key_tag: String,
    /// Identifier announced to the IDP.
    pub key_identifier: String,
    /// DER `SubjectPublicKeyInfo` of the device key.
    pub public_key: Vec<u8>,
    /// The device.
    pub device_information: DeviceInformation,
}

/// A registered pairing as listed by the IDP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingEntry {
    /// Device name.
    pub name: String,
    /// The signed pairing data that was registered.
    pub signed_pairing_data: String,
    /// Registration time, seconds since the epoch.
    pub creation_time: i64,
}

impl PairingEntry {
    /// The key identifier from the signed pairing data.
    ///
    /// Returns `None` if the pairing data cannot be decoded.
    #[must_use]
    pub fn key_identifier(&self) -> Option<String> {
        Jwt::parse(&self.signed_pairing_data)
            .and_then(|jwt| jwt.decode_payload::<PairingData>())
            .map(|data| data.key_identifier)
            .ok()
    }
}

/// The list of registered pairings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingEntries {
    /// All pairings of the user.
    #[serde(default)]
    pub pairing_entries: Vec<PairingEntry>,
}

/// Claims of the authentication data JWT, signed with the device key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationData {
    /// Format version.
    pub authentication_data_version: String,
    /// The challenge being answered.
    pub challenge_token: String,
    /// Card authentication certificate, base64url DER.
    pub auth_cert: String,
    /// Identifier of the device key.
    pub key_identifier: String,
    /// The device.
    pub device_information: DeviceInformation,
    /// Authentication methods.
    pub amr: Vec<String>,
    /// Challenge expiry, seconds since the epoch.
    pub exp: i64,
}

/// Authentication data signed with the device key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAuthenticationData {
    /// The attempt this answers.
    pub original_challenge: IdpChallengeSession,
    /// Signed [`AuthenticationData`].
    pub signed_authentication_data: Jwt,
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_include;

    use super::*;
    use crate::jwt::{Algorithm, JwtHeader};

    #[test]
    fn test_entry_key_identifier() {
        let data = PairingData {
            pairing_data_version: DATA_VERSION.to_string(),
            key_identifier: "key-1".to_string(),
            device_product: "Pixel".to_string(),
            serialnumber: "0A".to_string(),
            issuer: "GEM.KOMP-CA1 TEST-ONLY".to_string(),
            not_after: 1_900_000_000,
            public_key: "AA".to_string(),
        };
        let jwt = Jwt::new(JwtHeader::new(Algorithm::Bp256r1), &data).unwrap();
        let entry = PairingEntry {
            name: "My phone".to_string(),
            signed_pairing_data: jwt.serialize(),
            creation_time: 0,
        };
        assert_eq!(entry.key_identifier().as_deref(), Some("key-1"));

        let broken = PairingEntry {
            signed_pairing_data: "garbage".to_string(),
            ..entry
        };
        assert!(broken.key_identifier().is_none());
    }

    #[test]
    fn test_registration_data_wire_format() {
        let registration = RegistrationData {
            signed_pairing_data: Jwt::parse("eyJhbGciOiJCUDI1NlIxIn0.e30.AAAA").unwrap(),
            auth_cert: "MIIC".to_string(),
            device_information: DeviceInformation {
                name: "My phone".to_string(),
                device_type: DeviceType {
                    product: "Pixel".to_string(),
                    model: "GKWS6".to_string(),
                    os: "Android".to_string(),
                    os_version: "15".to_string(),
                    manufacturer: "Google".to_string(),
                },
            },
        };

        assert_json_include!(
            actual: serde_json::to_value(&registration).unwrap(),
            expected: serde_json::json!({
                "signed_pairing_data": "eyJhbGciOiJCUDI1NlIxIn0.e30.AAAA",
                "auth_cert": "MIIC",
                "device_information": {
                    "name": "My phone",
                    "device_type": { "os": "Android", "os_version": "15" }
                }
            })
        );
    }

    #[test]
    fn test_entries_default_to_empty() {
        let entries: PairingEntries = serde_json::from_str("{}").unwrap();
        assert!(entries.pairing_entries.is_empty());
    }
}
