//! A scripted IDP served by wiremock.
//!
//! Challenges, ID tokens, the discovery document and the insurer app
//! directory are signed with the `idp_sig` fixture key. Incoming signed
//! challenges, pairing data and authentication data are verified the way
//! the real IDP does, so a wrong key is rejected.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use erp_httpclient::{DefaultHttpClient, HttpClientConfig};
use erp_idp::jwt::{Es256Verifier, verifier_for_certificate};
use erp_idp::pkce::random_token;
use erp_idp::protocol::{
    AuthenticationData, DeviceInformation, DeviceType, Jwk, NestedChallenge, PairingData,
    PairingEntries, PairingEntry, RegistrationData,
};
use erp_idp::{
    BrainpoolP256r1Signer, ExtAuthRequestStorage, IdpSession, IdpSessionConfig, IdpToken, Jwt,
    ProfileStore, TokenStorage,
};
use erp_truststore::{StaticTrustStoreSession, TrustAnchor, TrustStore, X509};
use openssl::ec::EcKey;
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::{PKey, Private};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ROOT1: &str = include_str!("../fixtures/root1.pem");
pub const CA1: &str = include_str!("../fixtures/ca1.pem");
pub const IDP_SIG: &str = include_str!("../fixtures/idp_sig.pem");
pub const IDP_SIG_KEY: &str = include_str!("../fixtures/idp_sig.key.pem");
pub const ROGUE_LEAF: &str = include_str!("../fixtures/rogue_leaf.pem");
pub const ROGUE_LEAF_KEY: &str = include_str!("../fixtures/rogue_leaf.key.pem");
pub const SMARTCARD: &str = include_str!("../fixtures/smartcard.pem");
pub const SMARTCARD_KEY: &str = include_str!("../fixtures/smartcard.key.pem");

pub const CLIENT_ID: &str = "eRezeptApp";
pub const REDIRECT_URI: &str = "https://redirect.gematik.de/erezept";
pub const EXT_AUTH_REDIRECT_URI: &str = "https://das-e-rezept-fuer-deutschland.de/extauth";
pub const KK_APP_ID: &str = "kkv.gematik.de";
/// The code the simulated insurer app hands back.
pub const KK_AUTH_CODE: &str = "kk-authorization-code";

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone)]
struct ChallengeRecord {
    state: String,
    nonce: String,
    code_challenge: String,
    redirect_uri: String,
    expires: i64,
}

#[derive(Debug, Clone)]
struct RegisteredPairing {
    key_identifier: String,
    public_key: Vec<u8>,
    entry: PairingEntry,
}

/// What the fake IDP remembers between requests.
#[derive(Debug)]
pub struct IdpState {
    challenges: HashMap<String, ChallengeRecord>,
    codes: HashMap<String, ChallengeRecord>,
    sso_tokens: HashSet<String>,
    access_tokens: HashSet<String>,
    pairings: Vec<RegisteredPairing>,
    third_party: HashMap<String, ChallengeRecord>,
    /// Lifetime of issued challenges in seconds.
    pub challenge_ttl: i64,
    /// `expires_in` of issued tokens.
    pub expires_in: i64,
    pub discovery_requests: usize,
    pub sso_requests: usize,
    pub token_requests: usize,
}

impl IdpState {
    fn new() -> Self {
        Self {
            challenges: HashMap::new(),
            codes: HashMap::new(),
            sso_tokens: HashSet::new(),
            access_tokens: HashSet::new(),
            pairings: Vec::new(),
            third_party: HashMap::new(),
            challenge_ttl: 300,
            expires_in: 300,
            discovery_requests: 0,
            sso_requests: 0,
            token_requests: 0,
        }
    }

    fn issue_code(&mut self, record: ChallengeRecord) -> String {
        let code = format!("code-{}", random_token());
        self.codes.insert(code.clone(), record);
        code
    }

    fn issue_sso_token(&mut self) -> String {
        let sso_token = format!("sso-{}", random_token());
        self.sso_tokens.insert(sso_token.clone());
        sso_token
    }
}

// =============================================================================
// Signing key
// =============================================================================

struct IdpKey {
    key: EcKey<Private>,
    certificate: Vec<u8>,
}

impl IdpKey {
    fn load(key_pem: &str, certificate_pem: &str) -> Self {
        Self {
            key: PKey::private_key_from_pem(key_pem.as_bytes())
                .unwrap()
                .ec_key()
                .unwrap(),
            certificate: X509::from_pem(certificate_pem.as_bytes())
                .unwrap()
                .to_der()
                .unwrap(),
        }
    }

    fn sign(&self, claims: &Value) -> String {
        let header = json!({
            "alg": "BP256R1",
            "typ": "JWT",
            "kid": "puk_idp_sig",
            "x5c": [STANDARD.encode(&self.certificate)],
        });
        let input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let digest = Sha256::digest(input.as_bytes());
        let signature = EcdsaSig::sign(digest.as_slice(), &self.key).unwrap();
        let mut raw = signature.r().to_vec_padded(32).unwrap();
        raw.extend(signature.s().to_vec_padded(32).unwrap());
        format!("{input}.{}", URL_SAFE_NO_PAD.encode(raw))
    }
}

// =============================================================================
// Routes
// =============================================================================

struct Context {
    base: String,
    key: IdpKey,
    state: Arc<Mutex<IdpState>>,
}

impl Context {
    fn state(&self) -> MutexGuard<'_, IdpState> {
        self.state.lock().unwrap()
    }
}

#[derive(Clone, Copy)]
enum Route {
    Discovery,
    SigningKey,
    Challenge,
    SignedChallenge,
    Sso,
    Token,
    RegisterPairing,
    ListPairings,
    DeletePairing,
    AltAuthentication,
    KkApps,
    ThirdPartyStart,
    ThirdPartyFinish,
}

struct Handler {
    ctx: Arc<Context>,
    route: Route,
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn query(request: &Request) -> HashMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

fn form(request: &Request) -> HashMap<String, String> {
    url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect()
}

fn bearer(request: &Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn error_json(status: u16, error: &str, gematik_code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": error,
        "gematik_code": gematik_code,
        "gematik_error_text": format!("rejected with {gematik_code}"),
    }))
}

fn redirect(target: &str, params: &[(&str, &str)]) -> ResponseTemplate {
    let mut url = Url::parse(target).unwrap();
    url.query_pairs_mut().extend_pairs(params);
    ResponseTemplate::new(302).insert_header("Location", url.as_str())
}

fn code_redirect(record: &ChallengeRecord, code: &str, sso_token: Option<&str>) -> ResponseTemplate {
    let mut params = vec![("code", code), ("state", record.state.as_str())];
    if let Some(sso_token) = sso_token {
        params.push(("ssotoken", sso_token));
    }
    redirect(&record.redirect_uri, &params)
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

impl Respond for Handler {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match self.route {
            Route::Discovery => self.discovery(),
            Route::SigningKey => ResponseTemplate::new(200)
                .set_body_json(Jwk::from_certificate("puk_idp_sig", &self.ctx.key.certificate)),
            Route::Challenge => self.challenge(request),
            Route::SignedChallenge => self.signed_challenge(request),
            Route::Sso => self.sso(request),
            Route::Token => self.token(request),
            Route::RegisterPairing => self.register_pairing(request),
            Route::ListPairings => self.list_pairings(request),
            Route::DeletePairing => self.delete_pairing(request),
            Route::AltAuthentication => self.alt_authentication(request),
            Route::KkApps => self.kk_apps(),
            Route::ThirdPartyStart => self.third_party_start(request),
            Route::ThirdPartyFinish => self.third_party_finish(request),
        }
    }
}

impl Handler {
    fn discovery(&self) -> ResponseTemplate {
        self.ctx.state().discovery_requests += 1;
        let base = &self.ctx.base;
        let now = now();
        let document = json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/sign_response"),
            "sso_endpoint": format!("{base}/sso_response"),
            "token_endpoint": format!("{base}/token"),
            "auth_pair_endpoint": format!("{base}/alt_response"),
            "uri_pair": format!("{base}/pairings"),
            "uri_puk_idp_sig": format!("{base}/idpSig/jwk.json"),
            "kk_app_list_uri": format!("{base}/directory/kk_apps"),
            "third_party_authorization_endpoint": format!("{base}/third_party_authorization"),
            "scopes_supported": ["openid", "e-rezept", "pairing"],
            "iat": now,
            "exp": now + 86_400,
        });
        ResponseTemplate::new(200).set_body_string(self.ctx.key.sign(&document))
    }

    fn challenge(&self, request: &Request) -> ResponseTemplate {
        let query = query(request);
        let (Some(state), Some(nonce), Some(code_challenge), Some(redirect_uri)) = (
            query.get("state"),
            query.get("nonce"),
            query.get("code_challenge"),
            query.get("redirect_uri"),
        ) else {
            return error_json(400, "invalid_request", "2004");
        };
        if query.get("code_challenge_method").map(String::as_str) != Some("S256")
            || query.get("client_id").map(String::as_str) != Some(CLIENT_ID)
        {
            return error_json(400, "invalid_request", "2008");
        }

        let mut st = self.ctx.state();
        let now = now();
        let expires = now + st.challenge_ttl;
        let claims = json!({
            "iss": self.ctx.base,
            "iat": now,
            "exp": expires,
            "token_type": "challenge",
            "response_type": "code",
            "state": state,
            "nonce": nonce,
            "code_challenge": code_challenge,
            "code_challenge_method": "S256",
            "client_id": CLIENT_ID,
            "scope": query.get("scope"),
            "redirect_uri": redirect_uri,
            "snc": random_token(),
        });
        let challenge = self.ctx.key.sign(&claims);
        st.challenges.insert(
            challenge.clone(),
            ChallengeRecord {
                state: state.clone(),
                nonce: nonce.clone(),
                code_challenge: code_challenge.clone(),
                redirect_uri: redirect_uri.clone(),
                expires,
            },
        );

        ResponseTemplate::new(200).set_body_json(json!({
            "challenge": challenge,
            "user_consent": {
                "requested_scopes": {
                    "openid": "Zugriff auf den ID-Token",
                    "e-rezept": "Zugriff auf die E-Rezept-Funktionalitaet",
                },
                "requested_claims": {
                    "given_name": "Zustimmung zur Verarbeitung des Vornamens",
                    "idNummer": "Zustimmung zur Verarbeitung der Versichertennummer",
                },
            },
        }))
    }

    /// Removes and returns the challenge record if it is still valid.
    fn take_challenge(&self, st: &mut IdpState, challenge: &str) -> Option<ChallengeRecord> {
        st.challenges
            .remove(challenge)
            .filter(|record| record.expires > now())
    }

    fn signed_challenge(&self, request: &Request) -> ResponseTemplate {
        let form = form(request);
        let Some(jwt) = form.get("signed_challenge").and_then(|s| Jwt::parse(s).ok()) else {
            return error_json(400, "invalid_request", "2030");
        };
        if jwt.header().cty.as_deref() != Some("NJWT") {
            return error_json(400, "invalid_request", "2030");
        }
        let verified = jwt
            .header()
            .leaf_certificate()
            .and_then(|certificate| verifier_for_certificate(certificate).ok())
            .and_then(|verifier| jwt.verify(verifier.as_ref()).ok())
            .unwrap_or(false);
        if !verified {
            return error_json(400, "invalid_request", "2013");
        }
        let Ok(nested) = jwt.decode_payload::<NestedChallenge>() else {
            return error_json(400, "invalid_request", "2030");
        };

        let mut st = self.ctx.state();
        let Some(record) = self.take_challenge(&mut st, &nested.njwt) else {
            return error_json(400, "invalid_request", "2032");
        };
        let code = st.issue_code(record.clone());
        let sso_token = st.issue_sso_token();
        code_redirect(&record, &code, Some(&sso_token))
    }

    fn sso(&self, request: &Request) -> ResponseTemplate {
        let form = form(request);
        let mut st = self.ctx.state();
        st.sso_requests += 1;

        let Some(record) = form
            .get("unsigned_challenge")
            .and_then(|challenge| self.take_challenge(&mut st, challenge))
        else {
            return error_json(400, "invalid_request", "2032");
        };
        let known = form
            .get("ssotoken")
            .is_some_and(|sso_token| st.sso_tokens.contains(sso_token));
        if !known {
            return redirect(
                &record.redirect_uri,
                &[
                    ("error", "invalid_request"),
                    ("gematik_code", "2040"),
                    ("state", record.state.as_str()),
                ],
            );
        }
        let code = st.issue_code(record.clone());
        code_redirect(&record, &code, None)
    }

    fn token(&self, request: &Request) -> ResponseTemplate {
        let form = form(request);
        let mut st = self.ctx.state();
        st.token_requests += 1;

        if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
            return error_json(400, "unsupported_grant_type", "3001");
        }
        let Some(record) = form.get("code").and_then(|code| st.codes.remove(code)) else {
            return error_json(400, "invalid_grant", "3013");
        };
        let verifier_matches = form
            .get("code_verifier")
            .is_some_and(|verifier| pkce_challenge(verifier) == record.code_challenge);
        if !verifier_matches {
            return error_json(400, "invalid_grant", "3016");
        }
        if form.get("redirect_uri") != Some(&record.redirect_uri) {
            return error_json(400, "invalid_grant", "3004");
        }

        let now = now();
        let access_token = format!("access-{}", random_token());
        st.access_tokens.insert(access_token.clone());
        let id_token = self.ctx.key.sign(&json!({
            "iss": self.ctx.base,
            "sub": "X110407071",
            "aud": CLIENT_ID,
            "nonce": record.nonce,
            "idNummer": "X110407071",
            "given_name": "Juna",
            "family_name": "Fuchs",
            "organization_name": "Test GKV-SV",
            "acr": "gematik-ehealth-loa-high",
            "amr": ["mfa", "sc", "pin"],
            "iat": now,
            "exp": now + st.expires_in,
        }));

        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "id_token": id_token,
            "expires_in": st.expires_in,
            "token_type": "Bearer",
        }))
    }

    fn authorized(&self, request: &Request) -> bool {
        bearer(request).is_some_and(|token| self.ctx.state().access_tokens.contains(&token))
    }

    fn register_pairing(&self, request: &Request) -> ResponseTemplate {
        if !self.authorized(request) {
            return error_json(401, "invalid_token", "4001");
        }
        let form = form(request);
        let Some(registration) = form
            .get("registration_data")
            .and_then(|data| serde_json::from_str::<RegistrationData>(data).ok())
        else {
            return error_json(400, "invalid_request", "2100");
        };
        let Ok(auth_cert) = URL_SAFE_NO_PAD.decode(&registration.auth_cert) else {
            return error_json(400, "invalid_request", "2100");
        };
        let verified = verifier_for_certificate(&auth_cert)
            .and_then(|verifier| registration.signed_pairing_data.verify(verifier.as_ref()))
            .unwrap_or(false);
        if !verified {
            return error_json(400, "invalid_request", "2013");
        }
        let Some((data, public_key)) = registration
            .signed_pairing_data
            .decode_payload::<PairingData>()
            .ok()
            .and_then(|data| {
                let public_key = URL_SAFE_NO_PAD.decode(&data.public_key).ok()?;
                Some((data, public_key))
            })
        else {
            return error_json(400, "invalid_request", "2100");
        };

        let entry = PairingEntry {
            name: registration.device_information.name.clone(),
            signed_pairing_data: registration.signed_pairing_data.serialize(),
            creation_time: now(),
        };
        self.ctx.state().pairings.push(RegisteredPairing {
            key_identifier: data.key_identifier,
            public_key,
            entry: entry.clone(),
        });
        ResponseTemplate::new(200).set_body_json(entry)
    }

    fn list_pairings(&self, request: &Request) -> ResponseTemplate {
        if !self.authorized(request) {
            return error_json(401, "invalid_token", "4001");
        }
        let pairing_entries = self
            .ctx
            .state()
            .pairings
            .iter()
            .map(|pairing| pairing.entry.clone())
            .collect();
        ResponseTemplate::new(200).set_body_json(PairingEntries { pairing_entries })
    }

    fn delete_pairing(&self, request: &Request) -> ResponseTemplate {
        if !self.authorized(request) {
            return error_json(401, "invalid_token", "4001");
        }
        let Some(key_identifier) = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)
        else {
            return error_json(400, "invalid_request", "2100");
        };
        let mut st = self.ctx.state();
        let before = st.pairings.len();
        st.pairings
            .retain(|pairing| pairing.key_identifier != key_identifier);
        if st.pairings.len() == before {
            return error_json(404, "invalid_request", "4002");
        }
        ResponseTemplate::new(204)
    }

    fn alt_authentication(&self, request: &Request) -> ResponseTemplate {
        let form = form(request);
        let Some(jwt) = form
            .get("signed_authentication_data")
            .and_then(|s| Jwt::parse(s).ok())
        else {
            return error_json(400, "invalid_request", "2030");
        };
        let Ok(data) = jwt.decode_payload::<AuthenticationData>() else {
            return error_json(400, "invalid_request", "2030");
        };

        let mut st = self.ctx.state();
        let Some(pairing) = st
            .pairings
            .iter()
            .find(|pairing| pairing.key_identifier == data.key_identifier)
            .cloned()
        else {
            return error_json(400, "invalid_request", "2000");
        };
        let verified = Es256Verifier::from_public_key_der(&pairing.public_key)
            .and_then(|verifier| jwt.verify(&verifier))
            .unwrap_or(false);
        if !verified {
            return error_json(400, "invalid_request", "2013");
        }
        let Some(record) = self.take_challenge(&mut st, &data.challenge_token) else {
            return error_json(400, "invalid_request", "2032");
        };
        let code = st.issue_code(record.clone());
        let sso_token = st.issue_sso_token();
        code_redirect(&record, &code, Some(&sso_token))
    }

    fn kk_apps(&self) -> ResponseTemplate {
        let directory = json!({
            "kk_app_list": [
                {"kk_app_name": "Gematik KK", "kk_app_id": KK_APP_ID},
                {"kk_app_name": "Test BKK", "kk_app_id": "bkk.example.de"},
            ],
            "iat": now(),
        });
        ResponseTemplate::new(200).set_body_string(self.ctx.key.sign(&directory))
    }

    fn third_party_start(&self, request: &Request) -> ResponseTemplate {
        let query = query(request);
        let (Some(kk_app_id), Some(state), Some(nonce), Some(code_challenge), Some(redirect_uri)) = (
            query.get("kk_app_id"),
            query.get("state"),
            query.get("nonce"),
            query.get("code_challenge"),
            query.get("redirect_uri"),
        ) else {
            return error_json(400, "invalid_request", "2004");
        };
        self.ctx.state().third_party.insert(
            state.clone(),
            ChallengeRecord {
                state: state.clone(),
                nonce: nonce.clone(),
                code_challenge: code_challenge.clone(),
                redirect_uri: redirect_uri.clone(),
                expires: now() + 600,
            },
        );
        redirect(
            "https://kk.example.com/authorize",
            &[("kk_app_id", kk_app_id.as_str()), ("state", state.as_str())],
        )
    }

    fn third_party_finish(&self, request: &Request) -> ResponseTemplate {
        let form = form(request);
        if form.get("code").map(String::as_str) != Some(KK_AUTH_CODE)
            || !form.contains_key("kk_app_redirect_uri")
        {
            return error_json(400, "invalid_request", "2051");
        }
        let mut st = self.ctx.state();
        let Some(record) = form.get("state").and_then(|state| st.third_party.remove(state)) else {
            return error_json(400, "invalid_request", "2052");
        };
        let code = st.issue_code(record.clone());
        let sso_token = st.issue_sso_token();
        code_redirect(&record, &code, Some(&sso_token))
    }
}

// =============================================================================
// Fake IDP
// =============================================================================

pub struct FakeIdp {
    server: MockServer,
    ctx: Arc<Context>,
}

impl FakeIdp {
    /// An IDP signing with the trusted `idp_sig` key.
    pub async fn start() -> Self {
        Self::start_with_key(IDP_SIG_KEY, IDP_SIG).await
    }

    /// An IDP signing with the given key and certificate.
    pub async fn start_with_key(key_pem: &str, certificate_pem: &str) -> Self {
        let server = MockServer::start().await;
        let ctx = Arc::new(Context {
            base: server.uri(),
            key: IdpKey::load(key_pem, certificate_pem),
            state: Arc::new(Mutex::new(IdpState::new())),
        });

        let routes = [
            ("GET", "/.well-known/openid-configuration", Route::Discovery),
            ("GET", "/idpSig/jwk.json", Route::SigningKey),
            ("GET", "/sign_response", Route::Challenge),
            ("POST", "/sign_response", Route::SignedChallenge),
            ("POST", "/sso_response", Route::Sso),
            ("POST", "/token", Route::Token),
            ("POST", "/pairings", Route::RegisterPairing),
            ("GET", "/pairings", Route::ListPairings),
            ("POST", "/alt_response", Route::AltAuthentication),
            ("GET", "/directory/kk_apps", Route::KkApps),
            ("GET", "/third_party_authorization", Route::ThirdPartyStart),
            ("POST", "/third_party_authorization", Route::ThirdPartyFinish),
        ];
        for (verb, route_path, route) in routes {
            Mock::given(method(verb))
                .and(path(route_path))
                .respond_with(Handler {
                    ctx: ctx.clone(),
                    route,
                })
                .mount(&server)
                .await;
        }
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/pairings/[^/]+$"))
            .respond_with(Handler {
                ctx: ctx.clone(),
                route: Route::DeletePairing,
            })
            .mount(&server)
            .await;

        Self { server, ctx }
    }

    pub fn discovery_url(&self) -> Url {
        Url::parse(&format!(
            "{}/.well-known/openid-configuration",
            self.server.uri()
        ))
        .unwrap()
    }

    pub fn state(&self) -> MutexGuard<'_, IdpState> {
        self.ctx.state()
    }

    pub fn config(&self) -> IdpSessionConfig {
        session_config(self.discovery_url())
    }

    pub fn session(&self, store: &ProfileStore) -> IdpSession {
        session_with(self.config(), store)
    }
}

// =============================================================================
// Client side helpers
// =============================================================================

pub fn session_config(discovery_url: Url) -> IdpSessionConfig {
    IdpSessionConfig::new(
        CLIENT_ID,
        discovery_url,
        Url::parse(REDIRECT_URI).unwrap(),
        Url::parse(EXT_AUTH_REDIRECT_URI).unwrap(),
    )
    .with_insecure_http(true)
}

pub fn trust_store() -> StaticTrustStoreSession {
    let root = TrustAnchor::from_pem(ROOT1).unwrap();
    let ca = X509::from_pem(CA1.as_bytes()).unwrap();
    StaticTrustStoreSession::new(TrustStore::new([&root]).with_intermediates([ca]))
}

pub fn session_with(config: IdpSessionConfig, store: &ProfileStore) -> IdpSession {
    session_with_storage(config, Arc::new(store.clone()), Arc::new(store.clone()))
}

pub fn session_with_storage(
    config: IdpSessionConfig,
    tokens: Arc<dyn TokenStorage>,
    requests: Arc<dyn ExtAuthRequestStorage>,
) -> IdpSession {
    let http = DefaultHttpClient::new(&HttpClientConfig::default()).unwrap();
    IdpSession::new(config, Arc::new(http), Arc::new(trust_store()), tokens, requests).unwrap()
}

pub fn card() -> BrainpoolP256r1Signer {
    BrainpoolP256r1Signer::from_pem(SMARTCARD_KEY.as_bytes(), SMARTCARD.as_bytes()).unwrap()
}

pub fn card_certificate() -> Vec<u8> {
    X509::from_pem(SMARTCARD.as_bytes()).unwrap().to_der().unwrap()
}

pub fn device() -> DeviceInformation {
    DeviceInformation {
        name: "Juna's phone".to_string(),
        device_type: DeviceType {
            product: "Pixel 8".to_string(),
            model: "GKWS6".to_string(),
            os: "Android".to_string(),
            os_version: "15".to_string(),
            manufacturer: "Google".to_string(),
        },
    }
}

/// Runs a complete smartcard login.
pub async fn login(session: &IdpSession) -> IdpToken {
    let challenge = session.request_challenge().await.unwrap();
    let signed = session.sign(challenge, &card(), &[]).await.unwrap();
    session.verify_and_exchange(signed).await.unwrap()
}

/// Builds a universal link as the insurer app would open it.
pub fn universal_link(code: &str, state: &str) -> Url {
    let mut url = Url::parse(EXT_AUTH_REDIRECT_URI).unwrap();
    url.query_pairs_mut()
        .append_pair("code", code)
        .append_pair("state", state)
        .append_pair("kk_app_redirect_uri", "https://kk.example.com/return");
    url
}
