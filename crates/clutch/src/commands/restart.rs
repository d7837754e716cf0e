use super::{explain, report};
use anyhow::{Context, Result};
use clutch_core::InterfaceBinder;

pub async fn run(binder: &InterfaceBinder) -> Result<()> {
    let outcome = binder.restart_application().await.map_err(explain)?;
    report(binder, outcome, "restarted");
    Ok(())
}

pub async fn set_graceful(binder: &InterfaceBinder, gracefully: bool) -> Result<()> {
    binder
        .set_restart_gracefully(gracefully)
        .await
        .context("Failed to save graceful restart setting")?;

    if gracefully {
        println!("Restarts will ask {} to quit first", binder.app().bundle_id);
    } else {
        println!("Restarts will kill {} immediately", binder.app().bundle_id);
    }
    Ok(())
}
