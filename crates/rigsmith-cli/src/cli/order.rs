//! `rigsmith order`: show the resolved component build order.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;

use rigsmith_core::registry::OutputProvider;
use rigsmith_core::resolver::DependencyGraph;

use super::OpenRig;

#[derive(Serialize)]
struct OrderEntry<'a> {
    position: usize,
    name: &'a str,
    #[serde(rename = "type")]
    component_type: &'a str,
    depends_on: Vec<&'a str>,
}

pub async fn handle_order(rig: &Path, dot: bool, json: bool) -> Result<()> {
    let opened = OpenRig::open(rig)
        .await
        .with_context(|| format!("failed to open rig at {}", rig.display()))?;
    let registry = opened.registry();
    let graph = DependencyGraph::build(&opened.rig.components, &registry);

    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let order = graph.order()?;
    let mut entries = Vec::with_capacity(order.len());
    for (position, record) in order.iter().enumerate() {
        entries.push(OrderEntry {
            position: position + 1,
            name: &record.name,
            component_type: &record.component_type,
            depends_on: graph.dependencies(&record.name)?,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Component").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Depends on").fg(Color::White),
    ]);
    for entry in &entries {
        let record_is_root = opened
            .rig
            .component(entry.name)
            .is_some_and(|r| registry.is_root(r));
        let name = if record_is_root {
            Cell::new(format!("{} (root)", entry.name)).fg(Color::Cyan)
        } else {
            Cell::new(entry.name).fg(Color::Cyan)
        };
        table.add_row(vec![
            Cell::new(entry.position).fg(Color::DarkGrey),
            name,
            Cell::new(entry.component_type),
            Cell::new(entry.depends_on.join(", ")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  {} {}", style("Build order for").bold(), style(&opened.rig.rig_name).cyan());
    println!();
    println!("{table}");
    let disabled = opened.rig.components.iter().filter(|r| !r.enabled).count();
    if disabled > 0 {
        println!(
            "  {} {disabled} disabled component{} not shown",
            style("i").blue().bold(),
            if disabled == 1 { "" } else { "s" }
        );
    }
    println!();
    Ok(())
}
