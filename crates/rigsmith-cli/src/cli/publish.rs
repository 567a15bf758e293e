//! `rigsmith publish`: write a built scene snapshot to the rig's output file.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use rigsmith_infra::publish::{PublishTarget, publish};

use super::OpenRig;
use super::scene_file::{read_scene, write_scene};

pub async fn handle_publish(rig: &Path, scene_path: &Path, no_versioning: bool, json: bool) -> Result<()> {
    let opened = OpenRig::open(rig)
        .await
        .with_context(|| format!("failed to open rig at {}", rig.display()))?;
    let mut scene = read_scene(scene_path).await?;
    let target = PublishTarget::for_rig(&opened.rig, &opened.paths)?;
    let versioning = opened.config.publish_versioning && !no_versioning;

    let record = publish(&mut scene, &target, versioning)?;
    if versioning {
        // Keep the stamped version in the working snapshot too.
        write_scene(scene_path, &scene).await?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Published {} to {}",
        style("✓").green().bold(),
        style(&opened.rig.rig_name).cyan(),
        style(record.path.display()).cyan()
    );
    if let (Some(version), Some(path)) = (record.version, &record.versioned_path) {
        println!("    {} v{version:03} {}", style("•").dim(), style(path.display()).dim());
    }
    println!();
    Ok(())
}
