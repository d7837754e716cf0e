use crate::Format;
use anyhow::Result;
use clutch_core::{Error, InterfaceBinder};
use comfy_table::{Cell, Color, Table};
use serde_json::json;

pub async fn run(binder: &InterfaceBinder, format: Format) -> Result<()> {
    let app = binder.app();
    let process = binder.process().await?;
    let state = binder.binding_state().await?;
    let gracefully = binder.restart_gracefully().await?;
    let permitted = binder.has_permissions().await;

    let (bound, available) = match binder.current_binding().await {
        Ok(interface) => (interface, true),
        Err(Error::InterfaceUnavailable(_)) => (None, false),
        Err(e) => return Err(e.into()),
    };

    if format == Format::Json {
        let status = json!({
            "bundle_id": app.bundle_id,
            "process": process,
            "target_interface_name": state.target_interface_name,
            "last_applied_name": state.last_applied_name,
            "current_binding": bound,
            "binding_available": available,
            "pending": !state.is_applied(state.target_interface_name.as_deref()),
            "restart_gracefully": gracefully,
            "has_permissions": permitted,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["FIELD", "VALUE"]);

    let (running, color) = match process.pid {
        Some(pid) => (format!("running (pid {pid})"), Color::Green),
        None => ("stopped".to_string(), Color::DarkGrey),
    };
    table.add_row(vec![Cell::new("application"), Cell::new(&app.bundle_id)]);
    table.add_row(vec![Cell::new("process"), Cell::new(running).fg(color)]);
    table.add_row(vec![
        Cell::new("target"),
        Cell::new(state.target_interface_name.as_deref().unwrap_or("unrestricted")),
    ]);

    let applied = match (&bound, &state.last_applied_name) {
        (Some(interface), _) => Cell::new(format!("{} ({})", interface.name, interface.address)),
        (None, Some(name)) if !available => {
            Cell::new(format!("{name} (not present)")).fg(Color::Red)
        }
        _ => Cell::new("unrestricted"),
    };
    table.add_row(vec![Cell::new("applied"), applied]);

    if !state.is_applied(state.target_interface_name.as_deref()) {
        table.add_row(vec![
            Cell::new("pending"),
            Cell::new("target differs from applied binding").fg(Color::Yellow),
        ]);
    }
    table.add_row(vec![
        Cell::new("graceful restart"),
        Cell::new(if gracefully { "on" } else { "off" }),
    ]);
    table.add_row(vec![
        Cell::new("permissions"),
        if permitted {
            Cell::new("granted").fg(Color::Green)
        } else {
            Cell::new("denied").fg(Color::Red)
        },
    ]);

    println!("{}", table);
    Ok(())
}
