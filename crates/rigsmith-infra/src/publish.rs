//! Rig publishing.
//!
//! Writes the built scene to the rig's output location. With versioning on,
//! a numbered copy is also kept under `versions/` and every top-level node is
//! stamped with the publish number:
//! ```text
//! {output_dir}/
//!   hero_rig.json
//!   versions/
//!     hero_rig_v001.json
//!     hero_rig_v002.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rigsmith_core::container::VERSION_ATTR;
use rigsmith_core::scene::Scene;
use rigsmith_types::error::SceneError;
use rigsmith_types::paths::RigPaths;
use rigsmith_types::rig::RigDescription;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::atomic::write_atomic;

pub const VERSIONS_DIR: &str = "versions";

/// Output file type when the rig names none.
pub const DEFAULT_OUTPUT_TYPE: &str = "json";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("rig '{0}' has no output_file to publish to")]
    NoOutputFile(String),

    #[error("failed to write '{}': {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Where a rig publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub dir: PathBuf,
    pub file_name: String,
}

/// What a publish wrote.
#[derive(Debug, Clone, Serialize)]
pub struct PublishRecord {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioned_path: Option<PathBuf>,
}

impl PublishTarget {
    /// Resolve the rig's `output_file`.
    ///
    /// A path with an extension is the output file itself; anything else is a
    /// directory, and the file is named `{rig_name}{suffix}.{type}`.
    pub fn for_rig(rig: &RigDescription, paths: &RigPaths) -> Result<Self, PublishError> {
        let output = rig
            .output_file
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PublishError::NoOutputFile(rig.rig_name.clone()))?;
        let output = paths.resolve(output);

        if output.extension().is_some() {
            let file_name = output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = output.parent().map(Path::to_path_buf).unwrap_or_default();
            return Ok(Self { dir, file_name });
        }

        let suffix = rig.output_file_suffix.as_deref().unwrap_or_default();
        let ext = rig.output_file_type.as_deref().unwrap_or(DEFAULT_OUTPUT_TYPE);
        Ok(Self {
            dir: output,
            file_name: format!("{}{suffix}.{ext}", rig.rig_name),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    fn stem_and_ext(&self) -> (&str, &str) {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (self.file_name.as_str(), DEFAULT_OUTPUT_TYPE),
        }
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.dir.join(VERSIONS_DIR)
    }

    /// `versions/{stem}_v{NNN}.{ext}`.
    pub fn version_path(&self, version: u32) -> PathBuf {
        let (stem, ext) = self.stem_and_ext();
        self.versions_dir().join(format!("{stem}_v{version:03}.{ext}"))
    }

    /// Version numbers already published, ascending.
    pub fn existing_versions(&self) -> Vec<u32> {
        let (stem, ext) = self.stem_and_ext();
        let prefix = format!("{stem}_v");
        let suffix = format!(".{ext}");
        let Ok(entries) = fs::read_dir(self.versions_dir()) else {
            return Vec::new();
        };
        let mut versions: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix(&prefix)?
                    .strip_suffix(&suffix)?
                    .parse()
                    .ok()
            })
            .collect();
        versions.sort_unstable();
        versions
    }

    pub fn next_version(&self) -> u32 {
        self.existing_versions().last().map_or(1, |v| v + 1)
    }
}

/// Write the scene to `target`, plus a numbered copy when `versioning`.
pub fn publish(
    scene: &mut dyn Scene,
    target: &PublishTarget,
    versioning: bool,
) -> Result<PublishRecord, PublishError> {
    let mut record = PublishRecord {
        path: target.path(),
        version: None,
        versioned_path: None,
    };

    if versioning {
        let version = target.next_version();
        let top_level: Vec<String> = scene
            .nodes()
            .into_iter()
            .filter(|n| scene.parent(n).is_none())
            .collect();
        for node in &top_level {
            scene.set_attr(node, VERSION_ATTR, json!(version))?;
        }
        let versioned_path = target.version_path(version);
        write_scene(&*scene, &versioned_path)?;
        tracing::info!(version, path = %versioned_path.display(), "rig versioned");
        record.version = Some(version);
        record.versioned_path = Some(versioned_path);
    }

    write_scene(&*scene, &record.path)?;
    tracing::info!(path = %record.path.display(), "rig published");
    Ok(record)
}

fn write_scene(scene: &dyn Scene, path: &Path) -> Result<(), PublishError> {
    let write_err = |message: String| PublishError::Write {
        path: path.to_path_buf(),
        message,
    };
    let json = serde_json::to_string_pretty(&scene.export()).map_err(|e| write_err(e.to_string()))?;
    write_atomic(path, json.as_bytes()).map_err(|e| write_err(e.to_string()))
}
