use anyhow::Result;

use crate::output::{print_devices, print_success};
use crate::session::SessionContext;

pub async fn list(ctx: &SessionContext) -> Result<()> {
    let token = ctx.session.valid_token().await?;
    let entries = ctx.session.list_devices(&token).await?;
    print_devices(&entries.pairing_entries);
    Ok(())
}

pub async fn remove(ctx: &SessionContext, key_identifier: &str) -> Result<()> {
    let token = ctx.session.valid_token().await?;
    ctx.session.unregister_device(key_identifier, &token).await?;
    print_success(&format!("Removed device {key_identifier}"));
    Ok(())
}
