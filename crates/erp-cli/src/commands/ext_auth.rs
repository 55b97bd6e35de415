use anyhow::{Context, Result};
use colored::Colorize;
use url::Url;

use crate::commands::auth::id_claims;
use crate::output::{print_ext_auth_requests, print_success, print_token};
use crate::session::SessionContext;

pub async fn start(ctx: &SessionContext, kk_app_id: &str) -> Result<()> {
    let directory = ctx.session.load_directory_kk_apps().await?;
    let Some(entry) = directory.apps.iter().find(|app| app.identifier == kk_app_id) else {
        let known: Vec<&str> = directory.apps.iter().map(|app| app.identifier.as_str()).collect();
        anyhow::bail!(
            "Unknown insurer app: {kk_app_id}. Available: {}",
            known.join(", ")
        );
    };

    let location = ctx.session.start_ext_auth(entry).await?;
    print_success(&format!("Started authentication with {}", entry.name.cyan()));
    println!("Open this link to continue in the insurer app:");
    println!("  {location}");
    println!("Then run: erx-idp ext-auth complete '<returned link>'");
    Ok(())
}

pub async fn complete(ctx: &SessionContext, link: &str) -> Result<()> {
    let link = Url::parse(link).with_context(|| format!("Invalid link: {link}"))?;
    let token = ctx.session.ext_auth_verify_and_exchange(&link).await?;
    print_success(&format!("Logged in (profile: {})", ctx.profile.cyan()));
    print_token(&token, id_claims(&token).as_ref());
    Ok(())
}

pub async fn pending(ctx: &SessionContext) -> Result<()> {
    let requests = ctx.session.pending_ext_auth_requests().await?;
    print_ext_auth_requests(&requests);
    Ok(())
}
