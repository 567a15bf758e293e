//! Data artifact types.
//!
//! Artifacts are named, versioned JSON files holding authored data that a
//! build re-applies: skeleton positions, guide placements, control shapes,
//! skin weights, deformers, shapes and poses. Every file shares one envelope
//! ([`ArtifactEnvelope`]); the `data` payload is kind-specific.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::BuildStage;

/// Schema version written by this build of the tool.
pub const ARTIFACT_SCHEMA_VERSION: &str = "1.0.0";

/// Kind of data an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Joint hierarchy and positions.
    Skeleton,
    /// Guide placement.
    Guide,
    /// Control curve shapes.
    Curve,
    /// Skin weights.
    Skin,
    /// Deformer parameters.
    Deformer,
    /// Layered deformation setup.
    DeformLayer,
    /// Blendshape data.
    Shape,
    /// Pose reader data.
    Pose,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 8] = [
        ArtifactKind::Skeleton,
        ArtifactKind::Guide,
        ArtifactKind::Curve,
        ArtifactKind::Skin,
        ArtifactKind::Deformer,
        ArtifactKind::DeformLayer,
        ArtifactKind::Shape,
        ArtifactKind::Pose,
    ];

    /// Stage at which a binding of this kind is loaded unless it names one.
    ///
    /// The skeleton must exist before components initialize; guide data
    /// repositions guides once they exist; everything else decorates the
    /// finished rig.
    pub fn default_stage(self) -> BuildStage {
        match self {
            ArtifactKind::Skeleton => BuildStage::Initialize,
            ArtifactKind::Guide => BuildStage::Guide,
            _ => BuildStage::Finalize,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Skeleton => "skeleton",
            ArtifactKind::Guide => "guide",
            ArtifactKind::Curve => "curve",
            ArtifactKind::Skin => "skin",
            ArtifactKind::Deformer => "deformer",
            ArtifactKind::DeformLayer => "deform_layer",
            ArtifactKind::Shape => "shape",
            ArtifactKind::Pose => "pose",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown artifact kind '{s}'"))
    }
}

/// On-disk wrapper shared by every artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    /// User that wrote the file.
    pub user: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub time: DateTime<Utc>,
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub data: serde_json::Value,
}

/// An artifact file that was not applied during a directory load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a successful `load` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub kind: ArtifactKind,
    /// Files applied, in application order.
    pub applied: Vec<PathBuf>,
    /// Files skipped (directory loads only).
    pub skipped: Vec<SkippedArtifact>,
    /// Number of nodes touched across all applied files.
    pub nodes: usize,
}

impl LoadSummary {
    pub fn new(kind: ArtifactKind) -> Self {
        Self {
            kind,
            applied: Vec::new(),
            skipped: Vec::new(),
            nodes: 0,
        }
    }

    /// Some files applied and some were skipped.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Binds an artifact path in a rig description to a build stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBinding {
    pub kind: ArtifactKind,
    /// File or directory, relative to the rig environment root.
    pub path: String,
    /// Stage override; defaults to [`ArtifactKind::default_stage`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<BuildStage>,
}

impl ArtifactBinding {
    pub fn stage(&self) -> BuildStage {
        self.stage.unwrap_or_else(|| self.kind.default_stage())
    }
}
