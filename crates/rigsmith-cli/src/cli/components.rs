//! `rigsmith components`: list registered component types.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use rigsmith_core::registry::{ComponentRegistry, ComponentTypeInfo};

/// `key=value` pairs, one per line, for the defaults column.
fn format_defaults(info: &ComponentTypeInfo) -> String {
    info.defaults
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn handle_components(json: bool) -> Result<()> {
    let types = ComponentRegistry::with_builtins().describe();

    if json {
        println!("{}", serde_json::to_string_pretty(&types)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Type").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Description").fg(Color::White),
        Cell::new("Defaults").fg(Color::White),
    ]);
    for info in &types {
        let id = if info.is_root {
            Cell::new(format!("{} (root)", info.id)).fg(Color::Cyan)
        } else {
            Cell::new(&info.id).fg(Color::Cyan)
        };
        table.add_row(vec![
            id,
            Cell::new(&info.version).fg(Color::DarkGrey),
            Cell::new(&info.description),
            Cell::new(format_defaults(info)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} component type{}",
        style(types.len()).bold(),
        if types.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}
