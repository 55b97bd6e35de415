use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "erx-idp")]
#[command(about = "Log in to the eRx identity provider with a health card key")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Discovery document URL (overrides config and ERX_IDP_DISCOVERY_URL)
    #[arg(short, long, global = true, env = "ERX_IDP_DISCOVERY_URL")]
    pub discovery_url: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "ERX_IDP_PROFILE", default_value = "default")]
    pub profile: String,

    /// Log protocol steps and HTTP exchanges to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in by signing a challenge with a health card key
    Login(LoginArgs),
    /// Renew the access token with the stored SSO token
    Refresh,
    /// Show the logged in insurant and token expiry
    Whoami,
    /// Remove the stored token
    Logout,
    /// Print the endpoints announced by the IDP
    Discovery,
    /// List insurer apps available for external authentication
    KkApps,
    /// Authenticate through an insurer app
    ExtAuth(ExtAuthArgs),
    /// Manage paired devices
    Devices(DevicesArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// PEM private key of the card's authentication certificate
    #[arg(long, env = "ERX_IDP_KEY")]
    pub key: PathBuf,
    /// Authentication certificate (PEM or DER)
    #[arg(long, env = "ERX_IDP_CERT")]
    pub cert: PathBuf,
}

#[derive(clap::Args)]
pub struct ExtAuthArgs {
    #[command(subcommand)]
    pub command: ExtAuthCommands,
}

#[derive(Subcommand)]
pub enum ExtAuthCommands {
    /// Start authentication with an insurer app and print the link to open
    Start {
        /// Insurer app identifier (see `kk-apps`)
        kk_app_id: String,
    },
    /// Finish authentication with the link the insurer app returned
    Complete {
        /// Universal link including code and state
        link: String,
    },
    /// List requests waiting for completion
    Pending,
}

#[derive(clap::Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommands,
}

#[derive(Subcommand)]
pub enum DevicesCommands {
    /// List devices paired with the logged in insurant
    List,
    /// Remove a paired device
    Remove {
        /// Key identifier of the device
        key_identifier: String,
    },
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the resolved profile
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (discovery_url, client_id, redirect_uri, ext_auth_redirect_uri, trust_anchor, log_level)
    pub key: String,
    /// Value
    pub value: String,
}
