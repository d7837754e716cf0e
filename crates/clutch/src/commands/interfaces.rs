use anyhow::Result;
use clutch_core::InterfaceBinder;
use comfy_table::{Cell, Color, Table};

pub async fn run(binder: &InterfaceBinder) -> Result<()> {
    let interfaces = binder.list_interfaces().await?;
    let target = binder.target_interface_name().await?;

    if interfaces.is_empty() {
        println!("No network interfaces found");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["INTERFACE", "ADDRESS", "FAMILY", ""]);

    for interface in &interfaces {
        let marker = if target.as_deref() == Some(interface.name.as_str()) {
            Cell::new("target").fg(Color::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(&interface.name),
            Cell::new(&interface.address),
            Cell::new(interface.family),
            marker,
        ]);
    }

    println!("{}", table);
    Ok(())
}
