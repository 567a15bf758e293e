//! Archetype commands: list the library, scaffold a rig environment.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use serde::Serialize;

use rigsmith_core::archetype::BASE_ARCHETYPE;
use rigsmith_infra::archetype_library::{create_rig_env, load_library};
use rigsmith_infra::config::{archetype_search_paths, load_global_config};
use rigsmith_types::archetype::HookKind;

use super::library_for;

#[derive(Serialize)]
struct ArchetypeView<'a> {
    name: &'a str,
    parents: &'a [String],
    pre_hooks: usize,
    post_hooks: usize,
    publish_hooks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_dir: Option<&'a Path>,
}

pub async fn handle_list(rig: Option<&Path>, json: bool) -> Result<()> {
    let library = library_for(rig).await?;
    let views: Vec<ArchetypeView<'_>> = library
        .templates()
        .map(|t| ArchetypeView {
            name: &t.name,
            parents: &t.parents,
            pre_hooks: t.hooks(HookKind::Pre).len(),
            post_hooks: t.hooks(HookKind::Post).len(),
            publish_hooks: t.hooks(HookKind::Pub).len(),
            source_dir: t.source_dir.as_deref(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!();
        println!(
            "  {} No archetypes found. Add directories to {} in {}.",
            style("i").blue().bold(),
            style("archetype_paths").yellow(),
            style("rigsmith.toml").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Parents").fg(Color::White),
        Cell::new("Hooks (pre/post/pub)").fg(Color::White),
        Cell::new("Location").fg(Color::White),
    ]);
    for view in &views {
        let name = if view.name == BASE_ARCHETYPE {
            Cell::new(format!("{} (base)", view.name)).fg(Color::Cyan)
        } else {
            Cell::new(view.name).fg(Color::Cyan)
        };
        table.add_row(vec![
            name,
            Cell::new(view.parents.join(", ")),
            Cell::new(format!("{}/{}/{}", view.pre_hooks, view.post_hooks, view.publish_hooks)),
            Cell::new(
                view.source_dir
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )
            .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} archetype{}",
        style(views.len()).bold(),
        if views.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

pub async fn handle_new(archetype: &str, name: &str, dir: &Path, yes: bool, json: bool) -> Result<()> {
    let config = load_global_config(dir).await;
    let library = load_library(&archetype_search_paths(&config, dir));
    let template = library
        .get(archetype)
        .ok_or_else(|| anyhow!("unknown archetype '{archetype}'"))?;

    let env_root: PathBuf = dir.join(name);
    if !yes && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Create rig '{}' from archetype '{}' in {}?",
                style(name).cyan().bold(),
                style(archetype).cyan(),
                env_root.display()
            ))
            .default(true)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let rig_file = create_rig_env(template, dir, name)?;

    if json {
        let out = serde_json::json!({
            "rig_name": name,
            "archetype": archetype,
            "env_root": env_root,
            "rig_file": rig_file,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} Rig environment created!", style("✓").green().bold());
    println!();
    println!("  {}  {}", style("Rig:").bold(), style(name).cyan());
    println!("  {}  {}", style("File:").bold(), rig_file.display());
    println!();
    println!(
        "  Build it: {}",
        style(format!("rigsmith build {}", rig_file.display())).yellow()
    );
    println!();
    Ok(())
}
