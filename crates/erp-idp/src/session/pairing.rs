//! Pairing management and authentication with a paired device key.

use erp_httpclient::{HttpRequest, NoFollow};
use url::Url;

use super::IdpSession;
use super::discovery::CachedDiscovery;
use super::response::{decode_json, ensure_success, parse_code_redirect};
use crate::error::{IdpErrorKind, IdpResult, IdpStage};
use crate::protocol::{
    ExchangeToken, IdpToken, PairingEntries, PairingEntry, RegistrationData,
    SignedAuthenticationData,
};

fn pairing_endpoint(discovery: &CachedDiscovery) -> Result<Url, IdpErrorKind> {
    discovery
        .document
        .uri_pair
        .clone()
        .ok_or(IdpErrorKind::MissingEndpoint("uri_pair"))
}

impl IdpSession {
    /// Registers a device key with the IDP.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Pairing`.
    pub async fn pair_device(
        &self,
        registration: &RegistrationData,
        token: &IdpToken,
    ) -> IdpResult<PairingEntry> {
        self.register_pairing(registration, token)
            .await
            .map_err(|kind| Self::reject(IdpStage::Pairing, kind))
    }

    async fn register_pairing(
        &self,
        registration: &RegistrationData,
        token: &IdpToken,
    ) -> Result<PairingEntry, IdpErrorKind> {
        let discovery = self.discovery().await?;
        let registration_data = serde_json::to_string(registration)
            .map_err(|e| IdpErrorKind::decoding(format!("registration data: {e}")))?;
        let request = HttpRequest::post_form(
            pairing_endpoint(&discovery)?,
            &[("registration_data", registration_data)],
        )
        .with_bearer(&token.access_token)?;

        let response = ensure_success(self.send(request, None).await?)?;
        let entry: PairingEntry = decode_json(&response)?;
        tracing::info!(name = %entry.name, "device paired");
        Ok(entry)
    }

    /// Lists the devices paired with the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Pairing`.
    pub async fn list_devices(&self, token: &IdpToken) -> IdpResult<PairingEntries> {
        self.fetch_pairings(token)
            .await
            .map_err(|kind| Self::reject(IdpStage::Pairing, kind))
    }

    async fn fetch_pairings(&self, token: &IdpToken) -> Result<PairingEntries, IdpErrorKind> {
        let discovery = self.discovery().await?;
        let request =
            HttpRequest::get(pairing_endpoint(&discovery)?).with_bearer(&token.access_token)?;
        let response = ensure_success(self.send(request, None).await?)?;
        decode_json(&response)
    }

    /// Removes the pairing registered under `key_identifier`.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Pairing`.
    pub async fn unregister_device(&self, key_identifier: &str, token: &IdpToken) -> IdpResult<()> {
        self.delete_pairing(key_identifier, token)
            .await
            .map_err(|kind| Self::reject(IdpStage::Pairing, kind))
    }

    async fn delete_pairing(&self, key_identifier: &str, token: &IdpToken) -> Result<(), IdpErrorKind> {
        let discovery = self.discovery().await?;
        let mut url = pairing_endpoint(&discovery)?;
        url.path_segments_mut()
            .map_err(|()| IdpErrorKind::Configuration("uri_pair cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(key_identifier);

        let request = HttpRequest::delete(url).with_bearer(&token.access_token)?;
        ensure_success(self.send(request, None).await?)?;
        tracing::info!(key_identifier, "pairing removed");
        Ok(())
    }

    /// Submits authentication data signed with a paired device key and
    /// returns the authorization code.
    ///
    /// The original challenge must be the pending attempt, as for
    /// [`verify`](Self::verify). Exchange the code with
    /// [`exchange`](Self::exchange).
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Verify`.
    pub async fn alt_verify(&self, signed: &SignedAuthenticationData) -> IdpResult<ExchangeToken> {
        let _flow = self.flow.lock().await;
        self.verify_authentication_data(signed)
            .await
            .map_err(|kind| self.fail(IdpStage::Verify, kind))
    }

    async fn verify_authentication_data(
        &self,
        signed: &SignedAuthenticationData,
    ) -> Result<ExchangeToken, IdpErrorKind> {
        self.take_pending(&signed.original_challenge)?;
        self.set_phase(super::SessionPhase::Verifying);

        let discovery = self.discovery().await?;
        let endpoint = discovery
            .document
            .auth_pair_endpoint
            .clone()
            .ok_or(IdpErrorKind::MissingEndpoint("auth_pair_endpoint"))?;
        let request = HttpRequest::post_form(
            endpoint,
            &[(
                "signed_authentication_data",
                signed.signed_authentication_data.serialize(),
            )],
        );
        let response = self.send(request, Some(&NoFollow)).await?;
        parse_code_redirect(&response, &signed.original_challenge.state)
    }
}
