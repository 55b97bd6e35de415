//! The IDP session.
//!
//! [`IdpSession`] runs the authentication flow
//! (discovery, challenge, sign, verify, exchange) and keeps the resulting
//! token fresh. Steps of one flow are serialized per session: only one
//! challenge is pending at a time, and a challenge can be submitted once.
//!
//! Refreshes are coalesced. Concurrent callers holding the same expired
//! token wait for a single refresh and share its result.

mod discovery;
mod ext_auth;
mod pairing;
mod phase;
mod response;

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use erp_httpclient::{HttpClient, HttpRequest, HttpResponse, Interceptor, NoFollow, RedirectHandler};
use erp_truststore::TrustStoreSession;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use url::Url;

use crate::config::{ConfigError, IdpSessionConfig};
use crate::error::{IdpError, IdpErrorKind, IdpResult, IdpStage};
use crate::jwt::{Jwt, JwtHeader};
use crate::pkce::{CHALLENGE_METHOD, PkceVerifier, random_token};
use crate::protocol::{
    ChallengeResponse, DiscoveryDocument, ExchangeToken, IdTokenClaims, IdpChallenge,
    IdpChallengeSession, IdpToken, NestedChallenge, SignedChallenge, TokenResponse,
};
use crate::signer::{JwtSigner, SignatureError, TimeoutSigner};
use crate::storage::{ExtAuthRequestStorage, TokenStorage};

use self::discovery::{CachedDiscovery, verify_signature};
use self::response::{decode_json, ensure_success, parse_code_redirect};

pub use phase::SessionPhase;

/// Content type of the nested JWT carrying a signed challenge.
const NESTED_JWT_CONTENT_TYPE: &str = "NJWT";

/// The challenge an attempt is waiting on.
#[derive(Debug)]
struct PendingAttempt {
    state: String,
}

/// Client side of the IDP protocol.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct IdpSession {
    config: IdpSessionConfig,
    http: Arc<dyn HttpClient>,
    trust_store: Arc<dyn TrustStoreSession>,
    storage: Arc<dyn TokenStorage>,
    ext_auth_storage: Arc<dyn ExtAuthRequestStorage>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    discovery: RwLock<Option<Arc<CachedDiscovery>>>,
    /// Serializes the steps of authentication flows.
    flow: Mutex<()>,
    /// Coalesces refreshes.
    refresh: Mutex<()>,
    pending: StdMutex<Option<PendingAttempt>>,
    phase: watch::Sender<SessionPhase>,
}

impl IdpSession {
    /// Creates a session.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is unusable.
    pub fn new(
        config: IdpSessionConfig,
        http: Arc<dyn HttpClient>,
        trust_store: Arc<dyn TrustStoreSession>,
        storage: Arc<dyn TokenStorage>,
        ext_auth_storage: Arc<dyn ExtAuthRequestStorage>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (phase, _) = watch::channel(SessionPhase::Idle);
        Ok(Self {
            config,
            http,
            trust_store,
            storage,
            ext_auth_storage,
            interceptors: Vec::new(),
            discovery: RwLock::new(None),
            flow: Mutex::new(()),
            refresh: Mutex::new(()),
            pending: StdMutex::new(None),
            phase,
        })
    }

    /// Adds an interceptor applied to every request this session sends.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &IdpSessionConfig {
        &self.config
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Subscribes to phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = %previous, to = %phase, "session phase changed");
        }
    }

    /// Tags `kind` with `stage`, logs it and marks the flow failed.
    fn fail(&self, stage: IdpStage, kind: IdpErrorKind) -> IdpError {
        tracing::warn!(%stage, error = %kind, category = %kind.category(), "IDP flow step failed");
        self.set_phase(SessionPhase::Failed(stage));
        kind.at(stage)
    }

    /// Tags `kind` with `stage` and logs it, leaving the phase alone.
    fn reject(stage: IdpStage, kind: IdpErrorKind) -> IdpError {
        tracing::warn!(%stage, error = %kind, category = %kind.category(), "IDP request failed");
        kind.at(stage)
    }

    async fn send(
        &self,
        request: HttpRequest,
        redirect: Option<&dyn RedirectHandler>,
    ) -> Result<HttpResponse, IdpErrorKind> {
        Ok(self.http.send(request, &self.interceptors, redirect).await?)
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// The discovery document, loaded and verified on first use.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Discovery` if the document cannot be fetched,
    /// its certificate is untrusted or its signature does not verify.
    pub async fn discovery_document(&self) -> IdpResult<DiscoveryDocument> {
        self.discovery()
            .await
            .map(|cached| cached.document.clone())
            .map_err(|kind| Self::reject(IdpStage::Discovery, kind))
    }

    /// Drops the cached document and loads it again.
    ///
    /// # Errors
    ///
    /// Same as [`discovery_document`](Self::discovery_document).
    pub async fn update_discovery_document(&self) -> IdpResult<DiscoveryDocument> {
        self.invalidate_discovery().await;
        self.discovery_document().await
    }

    // =========================================================================
    // Challenge
    // =========================================================================

    /// Requests a new authentication challenge.
    ///
    /// The returned challenge becomes the pending attempt; any earlier
    /// pending challenge can no longer be submitted.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Discovery` or `Challenge`.
    pub async fn request_challenge(&self) -> IdpResult<IdpChallengeSession> {
        let _flow = self.flow.lock().await;
        self.set_phase(SessionPhase::Discovering);
        let discovery = self
            .discovery()
            .await
            .map_err(|kind| self.fail(IdpStage::Discovery, kind))?;

        let challenge = self
            .fetch_challenge(&discovery)
            .await
            .map_err(|kind| self.fail(IdpStage::Challenge, kind))?;

        *self.lock_pending() = Some(PendingAttempt {
            state: challenge.state.clone(),
        });
        self.set_phase(SessionPhase::ChallengeRequested);
        Ok(challenge)
    }

    async fn fetch_challenge(
        &self,
        discovery: &CachedDiscovery,
    ) -> Result<IdpChallengeSession, IdpErrorKind> {
        let verifier_code = PkceVerifier::generate();
        let state = random_token();
        let nonce = random_token();

        let mut url = discovery.document.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("state", &state)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("code_challenge", &verifier_code.challenge())
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("response_type", "code")
            .append_pair("nonce", &nonce)
            .append_pair("scope", &self.config.scope());

        let response = ensure_success(self.send(HttpRequest::get(url), None).await?)?;
        let body: ChallengeResponse = decode_json(&response)?;
        verify_signature(&body.challenge, discovery.idp_key())?;

        let challenge = IdpChallenge::new(body.challenge, body.user_consent)?;
        if let Some(echoed) = &challenge.claims().state
            && *echoed != state
        {
            return Err(IdpErrorKind::StateMismatch);
        }

        let session = IdpChallengeSession {
            challenge,
            verifier_code,
            state,
            nonce,
        };
        if session.is_expired_at(OffsetDateTime::now_utc(), self.config.clock_skew) {
            return Err(IdpErrorKind::ChallengeExpired);
        }
        tracing::debug!(
            state = %session.state,
            expires = %session.challenge.expires_at(),
            "challenge received"
        );
        Ok(session)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<PendingAttempt>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes the pending attempt for `challenge`.
    fn take_pending(&self, challenge: &IdpChallengeSession) -> Result<(), IdpErrorKind> {
        let mut pending = self.lock_pending();
        match pending.take() {
            Some(attempt) if attempt.state == challenge.state => {
                if challenge.is_expired_at(OffsetDateTime::now_utc(), self.config.clock_skew) {
                    return Err(IdpErrorKind::ChallengeExpired);
                }
                Ok(())
            }
            other => {
                *pending = other;
                Err(IdpErrorKind::NoPendingChallenge)
            }
        }
    }

    fn discard_pending(&self, state: &str) {
        let mut pending = self.lock_pending();
        if pending.as_ref().is_some_and(|attempt| attempt.state == state) {
            *pending = None;
            tracing::debug!(state, "pending challenge discarded");
        }
    }

    // =========================================================================
    // Sign
    // =========================================================================

    /// Signs `challenge` with `signer`.
    ///
    /// The challenge is wrapped in a nested JWT (`cty: NJWT`) whose `x5c`
    /// carries `certificates`, or the signer's own certificates if empty.
    /// Signing is bounded by the configured signer timeout. If signing
    /// fails or is cancelled the pending attempt is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Sign`.
    pub async fn sign(
        &self,
        challenge: IdpChallengeSession,
        signer: &dyn JwtSigner,
        certificates: &[Vec<u8>],
    ) -> IdpResult<SignedChallenge> {
        let guard = DiscardOnDrop {
            session: self,
            state: challenge.state.clone(),
            armed: true,
        };

        match self.sign_challenge(&challenge, signer, certificates).await {
            Ok(signed_challenge) => {
                guard.disarm();
                self.set_phase(SessionPhase::ChallengeSigned);
                Ok(SignedChallenge {
                    original_challenge: challenge,
                    signed_challenge,
                })
            }
            Err(kind) => Err(self.fail(IdpStage::Sign, kind)),
        }
    }

    async fn sign_challenge(
        &self,
        challenge: &IdpChallengeSession,
        signer: &dyn JwtSigner,
        certificates: &[Vec<u8>],
    ) -> Result<Jwt, IdpErrorKind> {
        if challenge.is_expired_at(OffsetDateTime::now_utc(), self.config.clock_skew) {
            return Err(IdpErrorKind::ChallengeExpired);
        }

        let certificates = if certificates.is_empty() {
            signer.certificates()
        } else {
            certificates.to_vec()
        };
        if certificates.is_empty() {
            return Err(SignatureError::invalid_key("signer has no certificate").into());
        }

        let header = JwtHeader::new(signer.algorithm())
            .with_x5c(certificates)
            .with_cty(NESTED_JWT_CONTENT_TYPE);
        let nested = NestedChallenge {
            njwt: challenge.challenge.jwt().serialize(),
        };
        let signer = TimeoutSigner::new(signer, self.config.signer_timeout);
        Ok(Jwt::new(header, &nested)?.sign(&signer).await?)
    }

    // =========================================================================
    // Verify and exchange
    // =========================================================================

    /// Submits a signed challenge and returns the authorization code.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Verify`. `NoPendingChallenge` if the
    /// challenge is not the pending attempt or was already submitted.
    pub async fn verify(&self, signed: &SignedChallenge) -> IdpResult<ExchangeToken> {
        let _flow = self.flow.lock().await;
        self.verify_signed_challenge(signed)
            .await
            .map_err(|kind| self.fail_verify(kind))
    }

    fn fail_verify(&self, kind: IdpErrorKind) -> IdpError {
        // A stale or replayed submission leaves the current phase untouched.
        if matches!(kind, IdpErrorKind::NoPendingChallenge) {
            return Self::reject(IdpStage::Verify, kind);
        }
        self.fail(IdpStage::Verify, kind)
    }

    async fn verify_signed_challenge(
        &self,
        signed: &SignedChallenge,
    ) -> Result<ExchangeToken, IdpErrorKind> {
        self.take_pending(&signed.original_challenge)?;
        self.set_phase(SessionPhase::Verifying);

        let discovery = self.discovery().await?;
        let request = HttpRequest::post_form(
            discovery.document.authorization_endpoint.clone(),
            &[("signed_challenge", signed.signed_challenge.serialize())],
        );
        let response = self.send(request, Some(&NoFollow)).await?;
        parse_code_redirect(&response, &signed.original_challenge.state)
    }

    /// Exchanges an authorization code for a token and stores it.
    ///
    /// `redirect_uri` defaults to the configured redirect URI.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Exchange`.
    pub async fn exchange(
        &self,
        token: &ExchangeToken,
        challenge: &IdpChallengeSession,
        redirect_uri: Option<&Url>,
    ) -> IdpResult<IdpToken> {
        let _flow = self.flow.lock().await;
        self.exchange_and_store(
            token,
            &challenge.verifier_code,
            &challenge.nonce,
            redirect_uri,
            None,
        )
        .await
        .map_err(|kind| self.fail(IdpStage::Exchange, kind))
    }

    /// [`verify`](Self::verify) followed by [`exchange`](Self::exchange),
    /// without letting another flow step run in between.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Verify` or `Exchange`.
    pub async fn verify_and_exchange(&self, signed: SignedChallenge) -> IdpResult<IdpToken> {
        let _flow = self.flow.lock().await;
        let token = self
            .verify_signed_challenge(&signed)
            .await
            .map_err(|kind| self.fail_verify(kind))?;
        let challenge = &signed.original_challenge;
        self.exchange_and_store(&token, &challenge.verifier_code, &challenge.nonce, None, None)
            .await
            .map_err(|kind| self.fail(IdpStage::Exchange, kind))
    }

    async fn exchange_and_store(
        &self,
        token: &ExchangeToken,
        verifier_code: &PkceVerifier,
        nonce: &str,
        redirect_uri: Option<&Url>,
        previous_sso_token: Option<&str>,
    ) -> Result<IdpToken, IdpErrorKind> {
        self.set_phase(SessionPhase::Exchanging);
        let discovery = self.discovery().await?;
        let redirect_uri = redirect_uri.unwrap_or(&self.config.redirect_uri);

        let request = HttpRequest::post_form(
            discovery.document.token_endpoint.clone(),
            &[
                ("grant_type", "authorization_code"),
                ("code", token.code.as_str()),
                ("code_verifier", verifier_code.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ],
        );
        let response = ensure_success(self.send(request, None).await?)?;
        let body: TokenResponse = decode_json(&response)?;

        let id_token = Jwt::parse(&body.id_token)?;
        verify_signature(&id_token, discovery.idp_key())?;
        let claims: IdTokenClaims = id_token.decode_payload()?;
        if claims.nonce.as_deref() != Some(nonce) {
            return Err(IdpErrorKind::NonceMismatch);
        }
        if body.expires_in <= 0 {
            return Err(IdpErrorKind::TokenExpired);
        }

        let idp_token = IdpToken {
            access_token: body.access_token,
            id_token: body.id_token,
            sso_token: token
                .sso_token
                .clone()
                .or_else(|| previous_sso_token.map(str::to_string)),
            expires: OffsetDateTime::now_utc() + time::Duration::seconds(body.expires_in),
            token_type: body.token_type,
        };
        self.storage.set_token(idp_token.clone()).await?;
        self.set_phase(SessionPhase::Authenticated);
        tracing::info!(expires = %idp_token.expires, "IDP token stored");
        Ok(idp_token)
    }

    // =========================================================================
    // Token state
    // =========================================================================

    /// The stored token, expired or not.
    ///
    /// # Errors
    ///
    /// Returns a storage error tagged `Token`.
    pub async fn token(&self) -> IdpResult<Option<IdpToken>> {
        self.storage
            .token()
            .await
            .map_err(|e| Self::reject(IdpStage::Token, e.into()))
    }

    /// Returns `true` if a token is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error tagged `Token`.
    pub async fn is_logged_in(&self) -> IdpResult<bool> {
        Ok(self.token().await?.is_some())
    }

    /// A token that is valid for at least the configured clock skew,
    /// refreshing the stored one if needed.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` tagged `Token` if nothing is stored
    /// - refresh errors tagged `Refresh`
    pub async fn valid_token(&self) -> IdpResult<IdpToken> {
        let token = self
            .token()
            .await?
            .ok_or_else(|| IdpErrorKind::NotAuthenticated.at(IdpStage::Token))?;
        if !self.needs_refresh(&token) {
            return Ok(token);
        }
        self.refresh(&token).await
    }

    fn needs_refresh(&self, token: &IdpToken) -> bool {
        token.is_expired_at(OffsetDateTime::now_utc() + self.config.clock_skew)
    }

    /// Discards the stored token and any pending challenge.
    ///
    /// # Errors
    ///
    /// Returns a storage error tagged `Token`.
    pub async fn invalidate_access_token(&self) -> IdpResult<()> {
        let _flow = self.flow.lock().await;
        self.storage
            .clear_token()
            .await
            .map_err(|e| Self::reject(IdpStage::Token, e.into()))?;
        *self.lock_pending() = None;
        self.set_phase(SessionPhase::Idle);
        tracing::info!("IDP token discarded");
        Ok(())
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Renews `token` using its SSO token.
    ///
    /// If another caller already replaced `token` in storage with a valid
    /// one, that token is returned without contacting the IDP. A refresh
    /// that fails for any reason other than an unreachable IDP clears the
    /// stored token.
    ///
    /// # Errors
    ///
    /// Returns an error tagged `Refresh`. `NotAuthenticated` if `token` is
    /// no longer the stored token and nothing valid replaced it, for
    /// example after a concurrent refresh was rejected.
    pub async fn refresh(&self, token: &IdpToken) -> IdpResult<IdpToken> {
        let _refresh = self.refresh.lock().await;

        let stored = self
            .storage
            .token()
            .await
            .map_err(|e| self.fail(IdpStage::Refresh, e.into()))?;
        match stored {
            Some(stored) if stored.access_token == token.access_token => {}
            Some(stored) if !self.needs_refresh(&stored) => {
                tracing::debug!("token was refreshed concurrently");
                return Ok(stored);
            }
            _ => {
                tracing::debug!("token was discarded while waiting to refresh");
                return Err(self.fail(IdpStage::Refresh, IdpErrorKind::NotAuthenticated));
            }
        }

        let _flow = self.flow.lock().await;
        self.set_phase(SessionPhase::Refreshing);
        match self.refresh_token(token).await {
            Ok(refreshed) => Ok(refreshed),
            Err(kind) => {
                if !kind.is_connection_failure() {
                    tracing::warn!(error = %kind, "refresh rejected, discarding stored token");
                    if let Err(e) = self.storage.clear_token().await {
                        tracing::error!(error = %e, "failed to discard stored token");
                    }
                }
                Err(self.fail(IdpStage::Refresh, kind))
            }
        }
    }

    async fn refresh_token(&self, token: &IdpToken) -> Result<IdpToken, IdpErrorKind> {
        let sso_token = token
            .sso_token
            .as_deref()
            .ok_or(IdpErrorKind::MissingSsoToken)?;
        let discovery = self.discovery().await?;
        let challenge = self.fetch_challenge(&discovery).await?;

        let request = HttpRequest::post_form(
            discovery.document.sso_endpoint.clone(),
            &[
                ("ssotoken", sso_token.to_string()),
                ("unsigned_challenge", challenge.challenge.jwt().serialize()),
            ],
        );
        let response = self.send(request, Some(&NoFollow)).await?;
        let exchange = parse_code_redirect(&response, &challenge.state)?;

        self.exchange_and_store(
            &exchange,
            &challenge.verifier_code,
            &challenge.nonce,
            None,
            Some(sso_token),
        )
        .await
    }
}

/// Discards the pending attempt unless disarmed, so that a failed or
/// cancelled signing leaves nothing to submit.
struct DiscardOnDrop<'a> {
    session: &'a IdpSession,
    state: String,
    armed: bool,
}

impl DiscardOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DiscardOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.discard_pending(&self.state);
        }
    }
}
