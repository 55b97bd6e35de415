use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use erp_httpclient::HttpClientConfig;
use erp_idp::IdpSessionConfig;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_CLIENT_ID: &str = "eRezeptApp";
pub const DEFAULT_REDIRECT_URI: &str = "https://redirect.gematik.de/erezept";
pub const DEFAULT_EXT_AUTH_REDIRECT_URI: &str = "https://das-e-rezept-fuer-deutschland.de/extauth";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_auth_redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    /// PEM root certificate the IDP signing certificate must chain to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_anchor: Option<PathBuf>,
    /// PEM bundle of intermediate CA certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediates: Option<PathBuf>,
    /// Certificate list distribution point. Takes precedence over `intermediates`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_list_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_insecure_http: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpClientConfig>,
}

pub type ConfigFile = BTreeMap<String, ProfileConfig>;

impl ProfileConfig {
    /// Builds the session configuration, applying `discovery_override` from
    /// the command line or environment.
    pub fn session_config(&self, discovery_override: Option<&str>) -> Result<IdpSessionConfig> {
        let discovery = discovery_override
            .or(self.discovery_url.as_deref())
            .context(
                "No discovery URL configured. Use --discovery-url, set ERX_IDP_DISCOVERY_URL, \
                 or run: erx-idp config set discovery_url <url>",
            )?;
        let discovery_url = parse_url("discovery_url", discovery)?;
        let redirect_uri = parse_url(
            "redirect_uri",
            self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI),
        )?;
        let ext_auth_redirect_uri = parse_url(
            "ext_auth_redirect_uri",
            self.ext_auth_redirect_uri
                .as_deref()
                .unwrap_or(DEFAULT_EXT_AUTH_REDIRECT_URI),
        )?;

        let mut config = IdpSessionConfig::new(
            self.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID),
            discovery_url,
            redirect_uri,
            ext_auth_redirect_uri,
        )
        .with_insecure_http(self.allow_insecure_http.unwrap_or(false));
        if let Some(scopes) = &self.scopes {
            config = config.with_scopes(scopes);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn http_config(&self) -> HttpClientConfig {
        self.http.clone().unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        match key {
            "discovery_url" => self.discovery_url = Some(value),
            "client_id" => self.client_id = Some(value),
            "redirect_uri" => self.redirect_uri = Some(value),
            "ext_auth_redirect_uri" => self.ext_auth_redirect_uri = Some(value),
            "trust_anchor" => self.trust_anchor = Some(PathBuf::from(value)),
            "intermediates" => self.intermediates = Some(PathBuf::from(value)),
            "cert_list_url" => self.cert_list_url = Some(value),
            "log_level" => self.log_level = Some(value),
            "allow_insecure_http" => {
                self.allow_insecure_http =
                    Some(value.parse().context("allow_insecure_http must be true or false")?);
            }
            "scopes" => {
                self.scopes = Some(value.split_whitespace().map(str::to_string).collect());
            }
            other => anyhow::bail!(
                "Unknown config key: {other}. Valid keys: discovery_url, client_id, redirect_uri, \
                 ext_auth_redirect_uri, scopes, trust_anchor, intermediates, cert_list_url, \
                 allow_insecure_http, log_level"
            ),
        }
        Ok(())
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).with_context(|| format!("Invalid {field}: {value}"))
}

/// Root of all CLI state, `~/.erx-idp` unless `ERX_IDP_HOME` is set.
pub fn home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("ERX_IDP_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .context("Cannot determine home directory")?
            .join(".erx-idp"),
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join("config.toml"))
}

pub fn load_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn save_to(path: &Path, all: &ConfigFile) -> Result<()> {
    let content = toml::to_string_pretty(all)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    let mut all = load_from(&config_path()?)?;
    Ok(all.remove(profile).unwrap_or_default())
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    let path = config_path()?;
    let mut all = load_from(&path)?;
    all.insert(profile.to_string(), config.clone());
    save_to(&path, &all)
}
