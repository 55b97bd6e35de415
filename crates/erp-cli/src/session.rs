use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use erp_httpclient::{DefaultHttpClient, HttpClient, LogDetail, LoggingInterceptor};
use erp_idp::IdpSession;
use erp_truststore::{
    DefaultTrustStoreSession, StaticTrustStoreSession, TrustAnchor, TrustStore, TrustStoreConfig,
    TrustStoreSession, X509,
};
use url::Url;

use crate::cli::Cli;
use crate::config::{self, ProfileConfig};
use crate::store::FileStore;

/// Everything a command needs for one profile.
pub struct SessionContext {
    pub profile: String,
    pub session: IdpSession,
}

pub fn open(cli: &Cli, profile: &ProfileConfig) -> Result<SessionContext> {
    let session_config = profile.session_config(cli.discovery_url.as_deref())?;

    let mut http = DefaultHttpClient::new(&profile.http_config())
        .context("Failed to build HTTP client")?;
    if cli.verbose {
        http = http.with_interceptor(LoggingInterceptor::new(LogDetail::Headers));
    }
    let http: Arc<dyn HttpClient> = Arc::new(http);

    let trust_store = trust_store(profile, http.clone())?;
    let store = Arc::new(profile_store(&cli.profile)?);

    let session = IdpSession::new(
        session_config,
        http,
        trust_store,
        store.clone(),
        store.clone(),
    )?;

    Ok(SessionContext {
        profile: cli.profile.clone(),
        session,
    })
}

/// File storage for `profile` under the CLI home directory.
pub fn profile_store(profile: &str) -> Result<FileStore> {
    Ok(FileStore::new(config::home_dir()?.join(profile)))
}

fn trust_store(profile: &ProfileConfig, http: Arc<dyn HttpClient>) -> Result<Arc<dyn TrustStoreSession>> {
    let anchor_path = profile.trust_anchor.as_deref().context(
        "No trust anchor configured. Run: erx-idp config set trust_anchor <root.pem>",
    )?;
    let anchor = TrustAnchor::from_pem(&read_to_string(anchor_path)?)
        .with_context(|| format!("Invalid trust anchor {}", anchor_path.display()))?;

    if let Some(cert_list_url) = &profile.cert_list_url {
        let url = Url::parse(cert_list_url)
            .with_context(|| format!("Invalid cert_list_url: {cert_list_url}"))?;
        let session = DefaultTrustStoreSession::new(TrustStoreConfig::new(url), vec![anchor], http)?;
        return Ok(Arc::new(session));
    }

    let intermediates = match &profile.intermediates {
        Some(path) => X509::stack_from_pem(read_to_string(path)?.as_bytes())
            .with_context(|| format!("Invalid intermediate bundle {}", path.display()))?,
        None => Vec::new(),
    };
    let store = TrustStore::new([&anchor]).with_intermediates(intermediates);
    Ok(Arc::new(StaticTrustStoreSession::new(store)))
}

fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}
