use super::{explain, report};
use anyhow::Result;
use clutch_core::InterfaceBinder;

pub async fn run(binder: &InterfaceBinder, name: &str) -> Result<()> {
    let outcome = binder
        .bind_to_interface_named(name)
        .await
        .map_err(explain)?;
    report(binder, outcome, &format!("bound to {name}"));
    Ok(())
}

pub async fn unbind(binder: &InterfaceBinder) -> Result<()> {
    let outcome = binder.unbind_from_interface().await.map_err(explain)?;
    report(binder, outcome, "unbound");
    Ok(())
}
