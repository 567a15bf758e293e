//! Filesystem artifact store.
//!
//! Every artifact is one pretty-printed JSON envelope. A binding may point at
//! a single file or at a directory, in which case every `*.json` file inside
//! is applied in lexical order. Inside a directory a bad file is logged and
//! skipped; the rest still apply.

use std::fs;
use std::path::{Path, PathBuf};

use rigsmith_core::artifact::{ArtifactHandlers, ArtifactStore};
use rigsmith_core::scene::Scene;
use rigsmith_types::artifact::{ArtifactEnvelope, ArtifactKind, LoadSummary, SkippedArtifact};
use rigsmith_types::error::ArtifactError;

use crate::atomic::write_atomic;

const ARTIFACT_EXTENSION: &str = "json";

/// [`ArtifactStore`] over JSON files on disk.
pub struct FsArtifactStore {
    handlers: ArtifactHandlers,
    user: String,
    skipped: Vec<SkippedArtifact>,
}

impl FsArtifactStore {
    pub fn new(handlers: ArtifactHandlers) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            handlers,
            user,
            skipped: Vec::new(),
        }
    }

    /// Name written into the `user` field of saved envelopes.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    fn read_envelope(path: &Path) -> Result<ArtifactEnvelope, ArtifactError> {
        let content = fs::read_to_string(path).map_err(|e| ArtifactError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn load_file(&self, scene: &mut dyn Scene, kind: ArtifactKind, path: &Path) -> Result<usize, ArtifactError> {
        let envelope = Self::read_envelope(path)?;
        let nodes = self.handlers.apply_envelope(scene, kind, path, &envelope)?;
        tracing::debug!(kind = %kind, path = %path.display(), nodes, "applied artifact");
        Ok(nodes)
    }

    fn load_dir(&mut self, scene: &mut dyn Scene, kind: ArtifactKind, dir: &Path) -> Result<LoadSummary, ArtifactError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| ArtifactError::Io {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION))
            .collect();
        files.sort();

        let mut summary = LoadSummary::new(kind);
        for file in files {
            match self.load_file(scene, kind, &file) {
                Ok(nodes) => {
                    summary.nodes += nodes;
                    summary.applied.push(file);
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        path = %file.display(),
                        error = %e,
                        "skipping artifact"
                    );
                    let skipped = SkippedArtifact {
                        kind,
                        path: file,
                        reason: e.to_string(),
                    };
                    self.skipped.push(skipped.clone());
                    summary.skipped.push(skipped);
                }
            }
        }
        Ok(summary)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(
        &self,
        scene: &dyn Scene,
        kind: ArtifactKind,
        targets: &[String],
        path: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        let envelope = self.handlers.make_envelope(scene, kind, targets, &self.user)?;
        let json = serde_json::to_string_pretty(&envelope).map_err(|e| ArtifactError::InvalidData {
            kind,
            reason: e.to_string(),
        })?;
        write_atomic(path, json.as_bytes()).map_err(|e| ArtifactError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::info!(kind = %kind, path = %path.display(), targets = targets.len(), "saved artifact");
        Ok(path.to_path_buf())
    }

    fn load(&mut self, scene: &mut dyn Scene, kind: ArtifactKind, path: &Path) -> Result<LoadSummary, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::NotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            return self.load_dir(scene, kind, path);
        }
        let nodes = self.load_file(scene, kind, path)?;
        let mut summary = LoadSummary::new(kind);
        summary.applied.push(path.to_path_buf());
        summary.nodes = nodes;
        Ok(summary)
    }

    fn skipped(&self) -> &[SkippedArtifact] {
        &self.skipped
    }
}
