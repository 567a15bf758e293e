//! `rigsmith artifact`: capture and apply artifact files against a scene snapshot.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use rigsmith_core::artifact::{ArtifactHandlers, ArtifactStore};
use rigsmith_infra::artifact::FsArtifactStore;
use rigsmith_types::artifact::ArtifactKind;

use super::scene_file::{read_scene, write_scene};

pub async fn handle_save(
    kind: ArtifactKind,
    targets: &[String],
    scene_path: &Path,
    path: &Path,
    json: bool,
) -> Result<()> {
    let scene = read_scene(scene_path).await?;
    let store = FsArtifactStore::new(ArtifactHandlers::standard());
    let written = store
        .save(&scene, kind, targets, path)
        .with_context(|| format!("failed to save {kind} artifact"))?;

    if json {
        let out = serde_json::json!({ "kind": kind, "path": written, "targets": targets });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Saved {} artifact for {} node{} to {}",
        style("✓").green().bold(),
        style(kind).cyan(),
        targets.len(),
        if targets.len() == 1 { "" } else { "s" },
        style(written.display()).dim()
    );
    println!();
    Ok(())
}

pub async fn handle_load(kind: ArtifactKind, scene_path: &Path, path: &Path, json: bool) -> Result<()> {
    let mut scene = read_scene(scene_path).await?;
    let mut store = FsArtifactStore::new(ArtifactHandlers::standard());
    let summary = store
        .load(&mut scene, kind, path)
        .with_context(|| format!("failed to load {kind} artifact from {}", path.display()))?;
    write_scene(scene_path, &scene).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Applied {} file{} ({} nodes)",
        style("✓").green().bold(),
        summary.applied.len(),
        if summary.applied.len() == 1 { "" } else { "s" },
        summary.nodes
    );
    for skipped in &summary.skipped {
        println!(
            "    {} skipped {} {}",
            style("!").yellow().bold(),
            skipped.path.display(),
            style(format!("({})", skipped.reason)).dim()
        );
    }
    println!();
    Ok(())
}
