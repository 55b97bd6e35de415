//! Authentication through an insurer app.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{FakeIdp, KK_APP_ID, KK_AUTH_CODE, session_with_storage, universal_link};
use erp_idp::{
    ExtAuthChallengeSession, ExtAuthRequestStorage, IdpErrorKind, IdpStage, KkAppEntry,
    MemoryStore, ProfileStore, SessionPhase, StorageError, TokenStorage,
};
use url::Url;

/// Request storage that cannot delete entries.
struct AppendOnlyRequests(ProfileStore);

#[async_trait]
impl ExtAuthRequestStorage for AppendOnlyRequests {
    async fn ext_auth_request(
        &self,
        state: &str,
    ) -> Result<Option<ExtAuthChallengeSession>, StorageError> {
        self.0.ext_auth_request(state).await
    }

    async fn set_ext_auth_request(
        &self,
        request: ExtAuthChallengeSession,
    ) -> Result<(), StorageError> {
        self.0.set_ext_auth_request(request).await
    }

    async fn remove_ext_auth_request(&self, _state: &str) -> Result<(), StorageError> {
        Err(StorageError::backend("read-only volume"))
    }

    async fn pending_ext_auth_requests(&self) -> Result<Vec<ExtAuthChallengeSession>, StorageError> {
        self.0.pending_ext_auth_requests().await
    }
}

fn state_of(location: &Url) -> String {
    location
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

async fn kk_app(session: &erp_idp::IdpSession) -> KkAppEntry {
    let directory = session.load_directory_kk_apps().await.unwrap();
    directory
        .apps
        .into_iter()
        .find(|app| app.identifier == KK_APP_ID)
        .unwrap()
}

#[tokio::test]
async fn test_directory_is_verified() {
    let idp = FakeIdp::start().await;
    let session = idp.session(&MemoryStore::new().default_profile());

    let directory = session.load_directory_kk_apps().await.unwrap();
    assert_eq!(directory.apps.len(), 2);
    assert_eq!(directory.apps[0].name, "Gematik KK");
}

#[tokio::test]
async fn test_external_authentication_flow() {
    let idp = FakeIdp::start().await;
    let store = MemoryStore::new().default_profile();
    let session = idp.session(&store);
    let app = kk_app(&session).await;

    let location = session.start_ext_auth(&app).await.unwrap();
    assert_eq!(location.host_str(), Some("kk.example.com"));
    assert_eq!(session.phase(), SessionPhase::ExternalAuthPending);

    let pending = session.pending_ext_auth_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entry, app);

    let state = state_of(&location);
    let token = session
        .ext_auth_verify_and_exchange(&universal_link(KK_AUTH_CODE, &state))
        .await
        .unwrap();
    assert!(!token.is_expired());
    assert!(session.is_logged_in().await.unwrap());
    assert!(session.pending_ext_auth_requests().await.unwrap().is_empty());
    assert_eq!(session.phase(), SessionPhase::Authenticated);
}

#[tokio::test]
async fn test_unknown_state_is_rejected() {
    let idp = FakeIdp::start().await;
    let session = idp.session(&MemoryStore::new().default_profile());

    let err = session
        .ext_auth_verify_and_exchange(&universal_link(KK_AUTH_CODE, "unknown"))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), IdpStage::ExternalAuth);
    assert!(matches!(err.kind(), IdpErrorKind::ExtAuthRequestNotFound(s) if s == "unknown"));
}

#[tokio::test]
async fn test_foreign_link_is_rejected() {
    let idp = FakeIdp::start().await;
    let session = idp.session(&MemoryStore::new().default_profile());

    let link = Url::parse("https://evil.example.com/extauth?code=c&state=s&kk_app_redirect_uri=x")
        .unwrap();
    let err = session.ext_auth_verify_and_exchange(&link).await.unwrap_err();
    assert!(matches!(err.kind(), IdpErrorKind::InvalidUniversalLink(_)));
}

#[tokio::test]
async fn test_failed_completion_keeps_request() {
    let idp = FakeIdp::start().await;
    let session = idp.session(&MemoryStore::new().default_profile());
    let app = kk_app(&session).await;

    let location = session.start_ext_auth(&app).await.unwrap();
    let state = state_of(&location);

    let err = session
        .ext_auth_verify_and_exchange(&universal_link("wrong-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        IdpErrorKind::ServerError { status: 400, .. }
    ));
    assert_eq!(session.pending_ext_auth_requests().await.unwrap().len(), 1);

    session
        .ext_auth_verify_and_exchange(&universal_link(KK_AUTH_CODE, &state))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cleanup_failure_does_not_fail_login() {
    let idp = FakeIdp::start().await;
    let store = MemoryStore::new().default_profile();
    let session = session_with_storage(
        idp.config(),
        Arc::new(store.clone()),
        Arc::new(AppendOnlyRequests(store.clone())),
    );
    let app = kk_app(&session).await;

    let location = session.start_ext_auth(&app).await.unwrap();
    let token = session
        .ext_auth_verify_and_exchange(&universal_link(KK_AUTH_CODE, &state_of(&location)))
        .await
        .unwrap();

    assert_eq!(store.token().await.unwrap(), Some(token));
    assert_eq!(session.phase(), SessionPhase::Authenticated);
    // The stale request is left behind.
    assert_eq!(session.pending_ext_auth_requests().await.unwrap().len(), 1);
}
