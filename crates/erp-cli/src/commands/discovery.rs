use anyhow::Result;

use crate::output::{print_discovery, print_kk_apps};
use crate::session::SessionContext;

pub async fn discovery(ctx: &SessionContext) -> Result<()> {
    let document = ctx.session.update_discovery_document().await?;
    print_discovery(&document);
    Ok(())
}

pub async fn kk_apps(ctx: &SessionContext) -> Result<()> {
    let directory = ctx.session.load_directory_kk_apps().await?;
    print_kk_apps(&directory.apps);
    Ok(())
}
