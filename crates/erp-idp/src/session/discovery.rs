//! Discovery document and IDP signing key.

use std::sync::Arc;
use std::time::Instant;

use erp_httpclient::HttpRequest;
use erp_truststore::certificate::{parse_der, subject_common_name};
use time::OffsetDateTime;

use super::IdpSession;
use super::response::{body_text, decode_json, ensure_success};
use crate::error::IdpErrorKind;
use crate::jwt::{Jwt, JwtVerifier, verifier_for_certificate};
use crate::protocol::{DiscoveryDocument, Jwk};

/// A verified discovery document together with the IDP signing key it names.
pub(crate) struct CachedDiscovery {
    pub(crate) document: DiscoveryDocument,
    idp_key: Box<dyn JwtVerifier>,
    valid_until: Instant,
}

impl CachedDiscovery {
    /// Verifier for JWTs signed by the IDP (challenges, ID tokens, directories).
    pub(crate) fn idp_key(&self) -> &dyn JwtVerifier {
        self.idp_key.as_ref()
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.valid_until
    }
}

impl IdpSession {
    /// The cached discovery document, fetching it if absent or stale.
    pub(crate) async fn discovery(&self) -> Result<Arc<CachedDiscovery>, IdpErrorKind> {
        {
            let cached = self.discovery.read().await;
            if let Some(cached) = cached.as_ref()
                && cached.is_fresh()
            {
                return Ok(cached.clone());
            }
        }

        let mut slot = self.discovery.write().await;
        if let Some(cached) = slot.as_ref()
            && cached.is_fresh()
        {
            return Ok(cached.clone());
        }

        let fetched = Arc::new(self.fetch_discovery().await?);
        *slot = Some(fetched.clone());
        Ok(fetched)
    }

    pub(crate) async fn invalidate_discovery(&self) {
        *self.discovery.write().await = None;
    }

    async fn fetch_discovery(&self) -> Result<CachedDiscovery, IdpErrorKind> {
        let response = ensure_success(
            self.send(HttpRequest::get(self.config.discovery_url.clone()), None)
                .await?,
        )?;
        let jwt = Jwt::parse(&body_text(&response)?)?;
        let certificate = jwt
            .header()
            .leaf_certificate()
            .ok_or(IdpErrorKind::MissingCertificate)?;
        let verifier = self.trusted_verifier(certificate).await?;
        verify_signature(&jwt, verifier.as_ref())?;

        let document: DiscoveryDocument = jwt.decode_payload()?;
        let now = OffsetDateTime::now_utc();
        if document.exp <= now {
            return Err(IdpErrorKind::unexpected_response(
                "discovery document is expired",
            ));
        }

        let idp_key = self.fetch_idp_signing_key(&document).await?;

        let remaining: std::time::Duration = (document.exp - now).try_into().unwrap_or_default();
        let ttl = remaining.min(self.config.discovery_max_age);
        tracing::info!(issuer = %document.issuer, ttl = ?ttl, "discovery document loaded");

        Ok(CachedDiscovery {
            document,
            idp_key,
            valid_until: Instant::now() + ttl,
        })
    }

    async fn fetch_idp_signing_key(
        &self,
        document: &DiscoveryDocument,
    ) -> Result<Box<dyn JwtVerifier>, IdpErrorKind> {
        let response = ensure_success(
            self.send(HttpRequest::get(document.uri_puk_idp_sig.clone()), None)
                .await?,
        )?;
        let jwk: Jwk = decode_json(&response)?;
        let certificate = jwk
            .leaf_certificate()
            .ok_or(IdpErrorKind::MissingCertificate)?;
        self.trusted_verifier(&certificate).await
    }

    /// A verifier for `der`, provided the certificate chains to a trust anchor.
    pub(crate) async fn trusted_verifier(
        &self,
        der: &[u8],
    ) -> Result<Box<dyn JwtVerifier>, IdpErrorKind> {
        let certificate = parse_der(der)?;
        if !self.trust_store.validate(&certificate).await? {
            let subject = subject_common_name(&certificate).unwrap_or_default();
            tracing::warn!(%subject, "rejecting untrusted IDP certificate");
            return Err(IdpErrorKind::UntrustedCertificate(subject));
        }
        Ok(verifier_for_certificate(der)?)
    }
}

/// Fails with `InvalidSignature` unless `jwt` verifies under `verifier`.
pub(crate) fn verify_signature(jwt: &Jwt, verifier: &dyn JwtVerifier) -> Result<(), IdpErrorKind> {
    if jwt.verify(verifier)? {
        Ok(())
    } else {
        Err(IdpErrorKind::InvalidSignature)
    }
}
