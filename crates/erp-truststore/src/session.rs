//! Trust store sessions.
//!
//! A [`TrustStoreSession`] is what the IDP session consults before it
//! trusts any certificate presented by the server. [`DefaultTrustStoreSession`]
//! assembles its store from the PKI distribution point and caches it for a
//! bounded time; [`StaticTrustStoreSession`] uses a fixed store.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use erp_httpclient::{HttpClient, HttpRequest};
use openssl::x509::X509;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::anchor::TrustAnchor;
use crate::cert_list::CertList;
use crate::certificate::{parse_der, subject_common_name};
use crate::config::TrustStoreConfig;
use crate::error::TrustStoreError;
use crate::store::TrustStore;

/// Certificate validation service used by the IDP session.
#[async_trait]
pub trait TrustStoreSession: Send + Sync {
    /// Returns `true` if `certificate` chains to a trusted anchor and is valid now.
    async fn validate(&self, certificate: &X509) -> Result<bool, TrustStoreError>;

    /// Returns the primary root certificate.
    async fn load_root_certificate(&self) -> Result<X509, TrustStoreError>;

    /// Returns a validated VAU encryption certificate.
    async fn load_vau_certificate(&self) -> Result<X509, TrustStoreError>;

    /// Drops cached trust material so that the next call re-fetches it.
    async fn reset(&self);
}

// =============================================================================
// Static session
// =============================================================================

/// A session over a fixed, pre-assembled [`TrustStore`].
#[derive(Debug, Clone)]
pub struct StaticTrustStoreSession {
    store: Arc<TrustStore>,
}

impl StaticTrustStoreSession {
    /// Creates a session over `store`.
    #[must_use]
    pub fn new(store: TrustStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

#[async_trait]
impl TrustStoreSession for StaticTrustStoreSession {
    async fn validate(&self, certificate: &X509) -> Result<bool, TrustStoreError> {
        self.store.validate(certificate)
    }

    async fn load_root_certificate(&self) -> Result<X509, TrustStoreError> {
        self.store
            .root_certificate()
            .cloned()
            .ok_or(TrustStoreError::NoRootCertificate)
    }

    async fn load_vau_certificate(&self) -> Result<X509, TrustStoreError> {
        self.store
            .ee_certificates()
            .first()
            .cloned()
            .ok_or(TrustStoreError::NoVauCertificate)
    }

    async fn reset(&self) {}
}

// =============================================================================
// Distribution point backed session
// =============================================================================

struct CachedStore {
    store: Arc<TrustStore>,
    fetched_at: Instant,
}

/// Fetches the certificate list through an [`HttpClient`] and caches the
/// assembled store for `anchor_ttl`.
///
/// There is no fallback: if the list cannot be fetched or decoded, every
/// validation call fails.
pub struct DefaultTrustStoreSession {
    config: TrustStoreConfig,
    bootstrap: Vec<TrustAnchor>,
    http: Arc<dyn HttpClient>,
    cache: RwLock<Option<CachedStore>>,
}

impl DefaultTrustStoreSession {
    /// Creates a session.
    ///
    /// # Errors
    ///
    /// Returns `TrustStoreError::Configuration` if `config` is invalid, or
    /// `TrustStoreError::NoRootCertificate` without bootstrap anchors.
    pub fn new(
        config: TrustStoreConfig,
        bootstrap: Vec<TrustAnchor>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, TrustStoreError> {
        config.validate()?;
        if bootstrap.is_empty() {
            return Err(TrustStoreError::NoRootCertificate);
        }
        Ok(Self {
            config,
            bootstrap,
            http,
            cache: RwLock::new(None),
        })
    }

    async fn store(&self) -> Result<Arc<TrustStore>, TrustStoreError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < self.config.anchor_ttl
            {
                return Ok(cached.store.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref()
            && cached.fetched_at.elapsed() < self.config.anchor_ttl
        {
            return Ok(cached.store.clone());
        }

        let store = Arc::new(self.fetch_store().await?);
        *cache = Some(CachedStore {
            store: store.clone(),
            fetched_at: Instant::now(),
        });
        Ok(store)
    }

    async fn fetch_store(&self) -> Result<TrustStore, TrustStoreError> {
        let url = self
            .config
            .cert_list_url
            .clone()
            .ok_or_else(|| TrustStoreError::configuration("cert_list_url is required"))?;

        tracing::debug!(%url, "fetching certificate list");
        let body = self.fetch("certificate list", HttpRequest::get(url)).await?;
        let list: CertList = serde_json::from_slice(&body)
            .map_err(|e| TrustStoreError::malformed_cert_list(e.to_string()))?;

        TrustStore::from_cert_list(&self.bootstrap, &list, OffsetDateTime::now_utc())
    }

    async fn fetch(
        &self,
        what: &'static str,
        request: HttpRequest,
    ) -> Result<Vec<u8>, TrustStoreError> {
        let response = self
            .http
            .send(request, &[], None)
            .await
            .map_err(|source| TrustStoreError::Fetch { what, source })?;

        if !response.is_success() {
            return Err(TrustStoreError::UnexpectedStatus {
                what,
                status: response.status.as_u16(),
            });
        }
        Ok(response.body)
    }
}

#[async_trait]
impl TrustStoreSession for DefaultTrustStoreSession {
    async fn validate(&self, certificate: &X509) -> Result<bool, TrustStoreError> {
        self.store().await?.validate(certificate)
    }

    async fn load_root_certificate(&self) -> Result<X509, TrustStoreError> {
        self.store()
            .await?
            .root_certificate()
            .cloned()
            .ok_or(TrustStoreError::NoRootCertificate)
    }

    async fn load_vau_certificate(&self) -> Result<X509, TrustStoreError> {
        let store = self.store().await?;

        let Some(url) = self.config.vau_certificate_url.clone() else {
            return store
                .ee_certificates()
                .first()
                .cloned()
                .ok_or(TrustStoreError::NoVauCertificate);
        };

        let body = self.fetch("VAU certificate", HttpRequest::get(url)).await?;
        let certificate = parse_der(&body)?;
        if store.validate(&certificate)? {
            Ok(certificate)
        } else {
            tracing::warn!(
                subject = ?subject_common_name(&certificate),
                "VAU certificate does not validate"
            );
            Err(TrustStoreError::NoVauCertificate)
        }
    }

    async fn reset(&self) {
        tracing::debug!("trust store cache reset");
        *self.cache.write().await = None;
    }
}
