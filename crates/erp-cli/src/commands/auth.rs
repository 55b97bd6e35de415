use anyhow::{Context, Result};
use colored::Colorize;
use erp_idp::protocol::IdTokenClaims;
use erp_idp::{BrainpoolP256r1Signer, IdpToken, Jwt, TokenStorage};
use tracing::debug;

use crate::cli::LoginArgs;
use crate::output::{print_error, print_field, print_success, print_token};
use crate::session::SessionContext;
use crate::store::FileStore;

/// Reads the display claims from the ID token. The signature was checked
/// when the token was issued.
pub fn id_claims(token: &IdpToken) -> Option<IdTokenClaims> {
    Jwt::parse(&token.id_token).ok()?.decode_payload().ok()
}

pub async fn login(ctx: &SessionContext, args: &LoginArgs) -> Result<()> {
    let signer = BrainpoolP256r1Signer::from_files(&args.key, &args.cert)
        .context("Failed to load the authentication key")?;
    let session = &ctx.session;

    println!("Requesting challenge from {}...", session.config().discovery_url.as_str().cyan());
    let challenge = session.request_challenge().await?;
    debug!(phase = %session.phase(), "challenge received");

    let signed = session.sign(challenge, &signer, &[]).await?;
    let token = session.verify_and_exchange(signed).await?;

    print_success(&format!("Logged in (profile: {})", ctx.profile.cyan()));
    print_token(&token, id_claims(&token).as_ref());
    Ok(())
}

pub async fn refresh(ctx: &SessionContext) -> Result<()> {
    let token = ctx
        .session
        .token()
        .await?
        .context("Not logged in. Run: erx-idp login --key <pem> --cert <pem>")?;
    let token = ctx.session.refresh(&token).await?;
    print_success("Token refreshed");
    print_token(&token, id_claims(&token).as_ref());
    Ok(())
}

pub async fn whoami(store: &FileStore, profile: &str) -> Result<()> {
    print_field("Profile", profile);
    match store.token().await? {
        Some(token) => print_token(&token, id_claims(&token).as_ref()),
        None => print_error(&format!("Not logged in (profile: \"{profile}\")")),
    }
    Ok(())
}

pub async fn logout(store: &FileStore, profile: &str) -> Result<()> {
    if store.token().await?.is_some() {
        store.clear_token().await?;
        print_success("Logged out (token removed)");
    } else {
        println!("No token found for profile \"{profile}\"");
    }
    Ok(())
}
