//! Device key management for pairing and alternative authentication.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use erp_truststore::certificate::{issuer_common_name, not_after, serial_number_hex};
use openssl::x509::X509;
use rand::Rng;

use crate::config::default_signer_timeout;
use crate::error::{IdpError, IdpErrorKind, IdpStage};
use crate::jwt::{Algorithm, Jwt, JwtHeader};
use crate::protocol::{
    AuthenticationData, DATA_VERSION, DeviceInformation, IdpChallengeSession, PairingData,
    PairingSession, RegistrationData, SignedAuthenticationData,
};
use crate::signer::{JwtSigner, SecureElement, SecureElementSigner, TimeoutSigner};
use crate::storage::{PairingRecord, PairingStorage};

/// Authentication methods claimed for device key authentication.
const ALT_AUTH_AMR: [&str; 3] = ["mfa", "hwk", "generic-biometric"];

/// Creates device keys, signs pairing data and answers challenges with
/// the paired key.
///
/// The device key lives in a [`SecureElement`]; the pairing itself (key
/// tag, identifier, card certificate) is kept in [`PairingStorage`].
/// Card and device key signatures are bounded by the signer timeout.
pub struct PairingSignatureProvider {
    element: Arc<dyn SecureElement>,
    storage: Arc<dyn PairingStorage>,
    device: DeviceInformation,
    signer_timeout: Duration,
}

impl PairingSignatureProvider {
    /// Creates a provider for `device`.
    #[must_use]
    pub fn new(
        element: Arc<dyn SecureElement>,
        storage: Arc<dyn PairingStorage>,
        device: DeviceInformation,
    ) -> Self {
        Self {
            element,
            storage,
            device,
            signer_timeout: default_signer_timeout(),
        }
    }

    /// Sets how long a signature may wait for the card or user presence.
    #[must_use]
    pub fn with_signer_timeout(mut self, timeout: Duration) -> Self {
        self.signer_timeout = timeout;
        self
    }

    /// The device being paired.
    #[must_use]
    pub fn device(&self) -> &DeviceInformation {
        &self.device
    }

    /// Returns `true` if a pairing is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error tagged `Pairing`.
    pub async fn is_paired(&self) -> Result<bool, IdpError> {
        Ok(self
            .storage
            .pairing()
            .await
            .map_err(|e| IdpErrorKind::from(e).at(IdpStage::Pairing))?
            .is_some())
    }

    /// Generates a fresh device key.
    ///
    /// # Errors
    ///
    /// Returns a signer error tagged `Pairing` if the key cannot be created.
    pub async fn register_data(&self) -> Result<PairingSession, IdpError> {
        let identifier: [u8; 32] = rand::thread_rng().r#gen();
        let key_identifier = URL_SAFE_NO_PAD.encode(identifier);
        let key_tag = format!("pairing.{key_identifier}");

        let public_key = self
            .element
            .generate_key(&key_tag)
            .await
            .map_err(|e| IdpErrorKind::from(e).at(IdpStage::Pairing))?;

        tracing::info!(%key_identifier, "device key generated");
        Ok(PairingSession {
            key_tag,
            key_identifier,
            public_key,
            device_information: self.device.clone(),
        })
    }

    /// Signs the pairing data for `session` with the health card and
    /// remembers the pairing.
    ///
    /// # Errors
    ///
    /// - `Crypto` if `auth_certificate` is not a certificate
    /// - the card's error if signing fails
    /// - storage errors
    pub async fn sign_pairing_session(
        &self,
        session: &PairingSession,
        card: &dyn JwtSigner,
        auth_certificate: &[u8],
    ) -> Result<RegistrationData, IdpError> {
        let at = |kind: IdpErrorKind| kind.at(IdpStage::Pairing);

        let certificate = X509::from_der(auth_certificate)
            .map_err(|e| at(IdpErrorKind::crypto(format!("card certificate: {e}"))))?;
        let data = PairingData {
            pairing_data_version: DATA_VERSION.to_string(),
            key_identifier: session.key_identifier.clone(),
            device_product: session.device_information.device_type.product.clone(),
            serialnumber: serial_number_hex(&certificate).map_err(|e| at(e.into()))?,
            issuer: issuer_common_name(&certificate).unwrap_or_default(),
            not_after: not_after(&certificate).map_err(|e| at(e.into()))?.unix_timestamp(),
            public_key: URL_SAFE_NO_PAD.encode(&session.public_key),
        };

        let card = TimeoutSigner::new(card, self.signer_timeout);
        let signed_pairing_data = Jwt::new(JwtHeader::new(card.algorithm()), &data)
            .map_err(|e| at(e.into()))?
            .sign(&card)
            .await
            .map_err(|e| at(e.into()))?;

        self.storage
            .set_pairing(PairingRecord {
                key_tag: session.key_tag.clone(),
                key_identifier: session.key_identifier.clone(),
                auth_certificate: auth_certificate.to_vec(),
            })
            .await
            .map_err(|e| at(e.into()))?;

        Ok(RegistrationData {
            signed_pairing_data,
            auth_cert: URL_SAFE_NO_PAD.encode(auth_certificate),
            device_information: session.device_information.clone(),
        })
    }

    /// Answers `challenge` with the paired device key.
    ///
    /// # Errors
    ///
    /// - `NotPaired` if no pairing is stored
    /// - the secure element's error if signing fails
    /// - `Timeout` if the secure element does not answer in time
    pub async fn authentication_data(
        &self,
        challenge: IdpChallengeSession,
    ) -> Result<SignedAuthenticationData, IdpError> {
        let at = |kind: IdpErrorKind| kind.at(IdpStage::Sign);

        let record = self
            .storage
            .pairing()
            .await
            .map_err(|e| at(e.into()))?
            .ok_or_else(|| at(IdpErrorKind::NotPaired))?;

        let data = AuthenticationData {
            authentication_data_version: DATA_VERSION.to_string(),
            challenge_token: challenge.challenge.jwt().serialize(),
            auth_cert: URL_SAFE_NO_PAD.encode(&record.auth_certificate),
            key_identifier: record.key_identifier.clone(),
            device_information: self.device.clone(),
            amr: ALT_AUTH_AMR.iter().map(ToString::to_string).collect(),
            exp: challenge.challenge.expires_at().unix_timestamp(),
        };

        let signer = SecureElementSigner::new(self.element.clone(), record.key_tag);
        let signer = TimeoutSigner::new(&signer, self.signer_timeout);
        let signed_authentication_data = Jwt::new(JwtHeader::new(Algorithm::Es256), &data)
            .map_err(|e| at(e.into()))?
            .sign(&signer)
            .await
            .map_err(|e| at(e.into()))?;

        Ok(SignedAuthenticationData {
            original_challenge: challenge,
            signed_authentication_data,
        })
    }

    /// Discards an unfinished or failed pairing.
    ///
    /// Deletes the device key and, if it was the stored pairing, the record.
    ///
    /// # Errors
    ///
    /// Returns signer or storage errors tagged `Pairing`.
    pub async fn abort(&self, session: &PairingSession) -> Result<(), IdpError> {
        let at = |kind: IdpErrorKind| kind.at(IdpStage::Pairing);

        self.element
            .delete_key(&session.key_tag)
            .await
            .map_err(|e| at(e.into()))?;
        let stored = self.storage.pairing().await.map_err(|e| at(e.into()))?;
        if stored.is_some_and(|record| record.key_tag == session.key_tag) {
            self.storage.clear_pairing().await.map_err(|e| at(e.into()))?;
        }
        tracing::info!(key_identifier = %session.key_identifier, "pairing aborted");
        Ok(())
    }
}
