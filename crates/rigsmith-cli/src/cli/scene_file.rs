//! Scene snapshots on disk.
//!
//! The CLI has no host application, so the scene between commands is a
//! [`MemoryScene`] serialized as JSON.

use std::path::Path;

use anyhow::{Context, Result};
use rigsmith_core::scene::MemoryScene;

/// Read a snapshot that must exist.
pub async fn read_scene(path: &Path) -> Result<MemoryScene> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse scene {}", path.display()))
}

/// Read a snapshot, or start an empty scene when the file does not exist yet.
pub async fn read_scene_or_new(path: &Path) -> Result<MemoryScene> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        read_scene(path).await
    } else {
        tracing::debug!(path = %path.display(), "no scene snapshot yet, starting empty");
        Ok(MemoryScene::new())
    }
}

pub async fn write_scene(path: &Path, scene: &MemoryScene) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(scene)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write scene {}", path.display()))?;
    tracing::debug!(path = %path.display(), nodes = scene.len(), "saved scene snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigsmith_core::scene::Scene;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_snapshot_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let scene = read_scene_or_new(&tmp.path().join("scene.json")).await.unwrap();
        assert!(scene.is_empty());
        assert!(read_scene(&tmp.path().join("scene.json")).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_keeps_hierarchy_and_attrs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("scene.json");
        let mut scene = MemoryScene::new();
        scene.create_node("hero_rig", None).unwrap();
        scene.create_node("spine_container", Some("hero_rig")).unwrap();
        scene.set_attr("spine_container", "build_step", json!(3)).unwrap();

        write_scene(&path, &scene).await.unwrap();
        let loaded = read_scene_or_new(&path).await.unwrap();
        assert_eq!(loaded, scene);
        assert_eq!(loaded.parent("spine_container").as_deref(), Some("hero_rig"));
    }
}
