//! Authentication through insurer apps.
//!
//! The flow leaves the process: [`IdpSession::start_ext_auth`] returns a
//! URL that opens the insurer app, and the app comes back later through
//! a universal link handled by [`IdpSession::ext_auth_verify_and_exchange`].
//! The request is persisted in between, keyed by `state`.

use erp_httpclient::{HttpRequest, NoFollow};
use url::Url;

use super::discovery::{CachedDiscovery, verify_signature};
use super::response::{
    body_text, ensure_success, parse_code_redirect, redirect_location, required_param,
};
use super::{IdpSession, SessionPhase};
use crate::error::{IdpErrorKind, IdpResult, IdpStage};
use crate::jwt::Jwt;
use crate::pkce::{CHALLENGE_METHOD, PkceVerifier, random_token};
use crate::protocol::{ExtAuthChallengeSession, IdpToken, KkAppDirectory, KkAppEntry};

fn third_party_endpoint(discovery: &CachedDiscovery) -> Result<Url, IdpErrorKind> {
    discovery
        .document
        .third_party_authorization_endpoint
        .clone()
        .ok_or(IdpErrorKind::MissingEndpoint("third_party_authorization_endpoint"))
}

impl IdpSession {
    /// Loads the signed directory of insurer apps.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `ExternalAuth`.
    pub async fn load_directory_kk_apps(&self) -> IdpResult<KkAppDirectory> {
        self.fetch_kk_apps()
            .await
            .map_err(|kind| Self::reject(IdpStage::ExternalAuth, kind))
    }

    async fn fetch_kk_apps(&self) -> Result<KkAppDirectory, IdpErrorKind> {
        let discovery = self.discovery().await?;
        let url = discovery
            .document
            .kk_app_list_uri
            .clone()
            .ok_or(IdpErrorKind::MissingEndpoint("kk_app_list_uri"))?;

        let response = ensure_success(self.send(HttpRequest::get(url), None).await?)?;
        let jwt = Jwt::parse(&body_text(&response)?)?;
        verify_signature(&jwt, discovery.idp_key())?;
        let directory: KkAppDirectory = jwt.decode_payload()?;
        tracing::debug!(apps = directory.apps.len(), "insurer app directory loaded");
        Ok(directory)
    }

    /// Starts authentication with `entry` and returns the URL that opens
    /// the insurer app.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `ExternalAuth`.
    pub async fn start_ext_auth(&self, entry: &KkAppEntry) -> IdpResult<Url> {
        let _flow = self.flow.lock().await;
        let location = self
            .request_ext_auth(entry)
            .await
            .map_err(|kind| self.fail(IdpStage::ExternalAuth, kind))?;
        self.set_phase(SessionPhase::ExternalAuthPending);
        Ok(location)
    }

    async fn request_ext_auth(&self, entry: &KkAppEntry) -> Result<Url, IdpErrorKind> {
        let discovery = self.discovery().await?;
        let verifier_code = PkceVerifier::generate();
        let state = random_token();
        let nonce = random_token();

        let mut url = third_party_endpoint(&discovery)?;
        url.query_pairs_mut()
            .append_pair("kk_app_id", &entry.identifier)
            .append_pair("state", &state)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("code_challenge", &verifier_code.challenge())
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("nonce", &nonce)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", &self.config.scope())
            .append_pair("response_type", "code");

        let response = self.send(HttpRequest::get(url), Some(&NoFollow)).await?;
        let location = redirect_location(&response)?;

        self.ext_auth_storage
            .set_ext_auth_request(ExtAuthChallengeSession {
                state: state.clone(),
                verifier_code,
                nonce,
                entry: entry.clone(),
            })
            .await?;
        tracing::info!(kk_app = %entry.identifier, %state, "external authentication started");
        Ok(location)
    }

    /// Completes external authentication from the universal link the
    /// insurer app returned with.
    ///
    /// The stored request is removed once a token was obtained; after a
    /// failure it stays and the link can be retried.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `ExternalAuth`.
    pub async fn ext_auth_verify_and_exchange(&self, universal_link: &Url) -> IdpResult<IdpToken> {
        let _flow = self.flow.lock().await;
        self.complete_ext_auth(universal_link)
            .await
            .map_err(|kind| self.fail(IdpStage::ExternalAuth, kind))
    }

    async fn complete_ext_auth(&self, universal_link: &Url) -> Result<IdpToken, IdpErrorKind> {
        let expected = &self.config.ext_auth_redirect_uri;
        if universal_link.scheme() != expected.scheme()
            || universal_link.host_str() != expected.host_str()
            || universal_link.path() != expected.path()
        {
            return Err(IdpErrorKind::InvalidUniversalLink(universal_link.to_string()));
        }

        let param = |name: &str| {
            required_param(universal_link, name)
                .ok_or_else(|| IdpErrorKind::InvalidUniversalLink(format!("missing {name}")))
        };
        let code = param("code")?;
        let state = param("state")?;
        let kk_app_redirect_uri = param("kk_app_redirect_uri")?;

        let request = self
            .ext_auth_storage
            .ext_auth_request(&state)
            .await?
            .ok_or_else(|| IdpErrorKind::ExtAuthRequestNotFound(state.clone()))?;

        self.set_phase(SessionPhase::Verifying);
        let discovery = self.discovery().await?;
        let form = HttpRequest::post_form(
            third_party_endpoint(&discovery)?,
            &[
                ("code", code.as_str()),
                ("state", state.as_str()),
                ("kk_app_redirect_uri", kk_app_redirect_uri.as_str()),
            ],
        );
        let response = self.send(form, Some(&NoFollow)).await?;
        let exchange = parse_code_redirect(&response, &state)?;

        let token = self
            .exchange_and_store(&exchange, &request.verifier_code, &request.nonce, None, None)
            .await?;
        if let Err(e) = self.ext_auth_storage.remove_ext_auth_request(&state).await {
            tracing::warn!(error = %e, %state, "failed to remove completed external auth request");
        }
        tracing::info!(kk_app = %request.entry.identifier, "external authentication completed");
        Ok(token)
    }

    /// External authentication requests still waiting for their insurer app.
    ///
    /// # Errors
    ///
    /// Returns a storage error tagged `ExternalAuth`.
    pub async fn pending_ext_auth_requests(&self) -> IdpResult<Vec<ExtAuthChallengeSession>> {
        self.ext_auth_storage
            .pending_ext_auth_requests()
            .await
            .map_err(|e| Self::reject(IdpStage::ExternalAuth, e.into()))
    }
}
