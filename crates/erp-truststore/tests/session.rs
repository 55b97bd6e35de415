//! DefaultTrustStoreSession against a wiremock distribution point.

use std::sync::Arc;
use std::time::Duration;

use erp_httpclient::{DefaultHttpClient, HttpClientConfig};
use erp_truststore::{
    CertList, DefaultTrustStoreSession, StaticTrustStoreSession, TrustAnchor, TrustStore,
    TrustStoreConfig, TrustStoreError, TrustStoreSession, X509,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT1: &str = include_str!("fixtures/root1.pem");
const ROOT2_CROSS: &str = include_str!("fixtures/root2_cross.pem");
const CA1: &str = include_str!("fixtures/ca1.pem");
const CA2: &str = include_str!("fixtures/ca2.pem");
const IDP_SIG: &str = include_str!("fixtures/idp_sig.pem");
const VAU: &str = include_str!("fixtures/vau.pem");
const EXPIRED: &str = include_str!("fixtures/expired.pem");
const ROGUE_LEAF: &str = include_str!("fixtures/rogue_leaf.pem");

fn cert(pem: &str) -> X509 {
    X509::from_pem(pem.as_bytes()).unwrap()
}

fn der(pem: &str) -> Vec<u8> {
    cert(pem).to_der().unwrap()
}

fn cert_list() -> CertList {
    CertList::from_der(&[der(ROOT2_CROSS)], &[der(CA1), der(CA2)], &[der(VAU)])
}

fn session(config: TrustStoreConfig) -> DefaultTrustStoreSession {
    let http = DefaultHttpClient::new(&HttpClientConfig::default()).unwrap();
    DefaultTrustStoreSession::new(
        config,
        vec![TrustAnchor::from_pem(ROOT1).unwrap()],
        Arc::new(http),
    )
    .unwrap()
}

fn config(server: &MockServer) -> TrustStoreConfig {
    TrustStoreConfig::new(Url::parse(&format!("{}/CertList", server.uri())).unwrap())
}

#[tokio::test]
async fn test_validates_against_distributed_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cert_list()))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(config(&server));

    assert!(session.validate(&cert(IDP_SIG)).await.unwrap());
    assert!(session.validate(&cert(VAU)).await.unwrap());
    assert!(!session.validate(&cert(EXPIRED)).await.unwrap());
    assert!(!session.validate(&cert(ROGUE_LEAF)).await.unwrap());

    let root = session.load_root_certificate().await.unwrap();
    assert_eq!(root.to_der().unwrap(), der(ROOT1));
}

#[tokio::test]
async fn test_reset_forces_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cert_list()))
        .expect(2)
        .mount(&server)
        .await;

    let session = session(config(&server));

    assert!(session.validate(&cert(IDP_SIG)).await.unwrap());
    assert!(session.validate(&cert(IDP_SIG)).await.unwrap());
    session.reset().await;
    assert!(session.validate(&cert(IDP_SIG)).await.unwrap());
}

#[tokio::test]
async fn test_cache_expires_after_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cert_list()))
        .expect(2)
        .mount(&server)
        .await;

    let session = session(config(&server).with_anchor_ttl(Duration::from_millis(50)));

    session.load_root_certificate().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.load_root_certificate().await.unwrap();
}

#[tokio::test]
async fn test_fetch_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let session = session(config(&server));
    let err = session.validate(&cert(IDP_SIG)).await.unwrap_err();

    assert!(matches!(
        err,
        TrustStoreError::UnexpectedStatus { status: 503, .. }
    ));
    assert!(err.is_fetch_error());
}

#[tokio::test]
async fn test_malformed_list_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let session = session(config(&server));
    let err = session.validate(&cert(IDP_SIG)).await.unwrap_err();
    assert!(err.is_malformed_data());
}

#[tokio::test]
async fn test_vau_certificate_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cert_list()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/VAUCertificate"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(der(VAU)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/RogueVAUCertificate"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(der(ROGUE_LEAF)))
        .mount(&server)
        .await;

    let good = session(config(&server).with_vau_certificate_url(
        Url::parse(&format!("{}/VAUCertificate", server.uri())).unwrap(),
    ));
    let vau = good.load_vau_certificate().await.unwrap();
    assert_eq!(vau.to_der().unwrap(), der(VAU));

    let rogue = session(config(&server).with_vau_certificate_url(
        Url::parse(&format!("{}/RogueVAUCertificate", server.uri())).unwrap(),
    ));
    assert!(matches!(
        rogue.load_vau_certificate().await,
        Err(TrustStoreError::NoVauCertificate)
    ));
}

#[tokio::test]
async fn test_vau_certificate_from_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/CertList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cert_list()))
        .mount(&server)
        .await;

    let session = session(config(&server));
    let vau = session.load_vau_certificate().await.unwrap();
    assert_eq!(vau.to_der().unwrap(), der(VAU));
}

#[test]
fn test_session_requires_config_and_anchor() {
    let http = Arc::new(DefaultHttpClient::new(&HttpClientConfig::default()).unwrap());

    let missing_url = DefaultTrustStoreSession::new(
        TrustStoreConfig::default(),
        vec![TrustAnchor::from_pem(ROOT1).unwrap()],
        http.clone(),
    );
    assert!(matches!(missing_url, Err(TrustStoreError::Configuration(_))));

    let missing_anchor = DefaultTrustStoreSession::new(
        TrustStoreConfig::new(Url::parse("https://erp.example.com/CertList").unwrap()),
        Vec::new(),
        http,
    );
    assert!(matches!(
        missing_anchor,
        Err(TrustStoreError::NoRootCertificate)
    ));
}

#[test]
fn test_static_session() {
    let store = TrustStore::new(&[TrustAnchor::from_pem(ROOT1).unwrap()])
        .with_intermediates([cert(CA1)]);
    let session = StaticTrustStoreSession::new(store);

    tokio_test::block_on(async {
        assert!(session.validate(&cert(IDP_SIG)).await.unwrap());
        assert!(!session.validate(&cert(ROGUE_LEAF)).await.unwrap());
        assert!(matches!(
            session.load_vau_certificate().await,
            Err(TrustStoreError::NoVauCertificate)
        ));
        session.reset().await;
        assert!(session.load_root_certificate().await.is_ok());
    });
}
