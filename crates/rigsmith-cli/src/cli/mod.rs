//! CLI command definitions and dispatch for the `rigsmith` binary.
//!
//! Uses clap derive macros for argument parsing. Every command that works on
//! a rig takes either a `.rig` file or a rig environment directory, defaulting
//! to `$RIGSMITH_FILE` and then the current directory.

pub mod archetypes;
pub mod artifact;
pub mod build;
pub mod components;
pub mod order;
pub mod publish;
pub mod scene_file;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;

use rigsmith_core::archetype::ArchetypeLibrary;
use rigsmith_core::registry::ComponentRegistry;
use rigsmith_infra::archetype_library::load_library;
use rigsmith_infra::config::{archetype_search_paths, load_global_config};
use rigsmith_infra::rig_file::{load_rig, locate_rig};
use rigsmith_types::artifact::ArtifactKind;
use rigsmith_types::build::BuildStage;
use rigsmith_types::config::GlobalConfig;
use rigsmith_types::paths::{RIG_FILE_VAR, RigPaths};
use rigsmith_types::rig::RigDescription;

/// Build character rigs from component descriptions.
#[derive(Parser)]
#[command(name = "rigsmith", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout via OpenTelemetry.
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the build pipeline for a rig.
    Build {
        /// Rig file or rig environment directory.
        #[arg(env = RIG_FILE_VAR, default_value = ".")]
        rig: PathBuf,

        /// Last stage to run.
        #[arg(long, default_value = "finalize")]
        until: BuildStage,

        /// Also run the optimize stage.
        #[arg(long)]
        optimize: bool,

        /// Build only this component and what it depends on.
        #[arg(long)]
        only: Option<String>,

        /// Do not run pre/post/publish hook scripts.
        #[arg(long)]
        no_hooks: bool,

        /// Scene snapshot to start from and write back to.
        #[arg(long)]
        scene: Option<PathBuf>,

        /// Publish the scene after a successful build.
        #[arg(long)]
        publish: bool,

        /// Write the build report as JSON to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the component build order.
    Order {
        #[arg(env = RIG_FILE_VAR, default_value = ".")]
        rig: PathBuf,

        /// Print the dependency graph in Graphviz DOT format.
        #[arg(long)]
        dot: bool,
    },

    /// List archetypes on the search path.
    Archetypes {
        /// Rig whose config adds search paths.
        #[arg(long, env = RIG_FILE_VAR)]
        rig: Option<PathBuf>,
    },

    /// Create a rig environment from an archetype.
    New {
        /// Archetype to start from.
        archetype: String,

        /// Name of the new rig.
        name: String,

        /// Directory to create the rig environment in.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// List registered component types and their default parameters.
    Components,

    /// Save or load data artifacts.
    Artifact {
        #[command(subcommand)]
        action: ArtifactCommand,
    },

    /// Publish a built scene snapshot to the rig's output file.
    Publish {
        #[arg(env = RIG_FILE_VAR, default_value = ".")]
        rig: PathBuf,

        /// Scene snapshot produced by `build --scene`.
        #[arg(long)]
        scene: PathBuf,

        /// Skip the numbered copy under `versions/`.
        #[arg(long)]
        no_versioning: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ArtifactCommand {
    /// Capture artifact data from a scene snapshot.
    Save {
        /// Artifact kind (skeleton, guide, curve, skin, ...).
        #[arg(long)]
        kind: ArtifactKind,

        /// Scene nodes to capture.
        #[arg(long = "target", required = true)]
        targets: Vec<String>,

        /// Scene snapshot to read from.
        #[arg(long)]
        scene: PathBuf,

        /// Artifact file to write.
        path: PathBuf,
    },

    /// Apply an artifact file or directory to a scene snapshot.
    Load {
        #[arg(long)]
        kind: ArtifactKind,

        /// Scene snapshot to update in place.
        #[arg(long)]
        scene: PathBuf,

        /// Artifact file or directory to apply.
        path: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Shared rig loading
// ---------------------------------------------------------------------------

/// A rig opened from disk with its environment and configuration.
pub struct OpenRig {
    pub rig: RigDescription,
    pub paths: RigPaths,
    pub config: GlobalConfig,
}

impl OpenRig {
    /// Locate and load a rig plus the `rigsmith.toml` in its environment root.
    pub async fn open(path: &Path) -> Result<Self> {
        let rig_file = locate_rig(path)?;
        let rig = load_rig(&rig_file)?;
        let paths = RigPaths::for_rig_file(&rig_file);
        let config = load_global_config(&paths.env_root).await;
        tracing::debug!(
            rig = %rig.rig_name,
            env_root = %paths.env_root.display(),
            "opened rig"
        );
        Ok(Self { rig, paths, config })
    }

    /// Builtin registry with the configured root type.
    pub fn registry(&self) -> ComponentRegistry {
        let mut registry = ComponentRegistry::with_builtins();
        registry.set_root_type(self.config.root_component_type.clone());
        registry
    }

    /// Archetypes from every configured search path.
    pub fn library(&self) -> ArchetypeLibrary {
        load_library(&archetype_search_paths(&self.config, &self.paths.env_root))
    }
}

/// Archetypes visible from `rig`, or from the user directory alone.
pub async fn library_for(rig: Option<&Path>) -> Result<ArchetypeLibrary> {
    match rig {
        Some(path) => Ok(OpenRig::open(path)
            .await
            .with_context(|| format!("failed to open rig at {}", path.display()))?
            .library()),
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            Ok(load_library(&archetype_search_paths(&GlobalConfig::default(), &cwd)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_flags_parse() {
        let cli = Cli::try_parse_from([
            "rigsmith", "build", "hero.rig", "--until", "connect", "--only", "arm_l", "--no-hooks", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Build { rig, until, only, no_hooks, optimize, .. } => {
                assert_eq!(rig, PathBuf::from("hero.rig"));
                assert_eq!(until, BuildStage::Connect);
                assert_eq!(only.as_deref(), Some("arm_l"));
                assert!(no_hooks);
                assert!(!optimize);
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(Cli::try_parse_from(["rigsmith", "build", "x.rig", "--until", "publish"]).is_err());
    }

    #[test]
    fn test_artifact_save_requires_target() {
        assert!(
            Cli::try_parse_from(["rigsmith", "artifact", "save", "--kind", "skin", "--scene", "s.json", "out.json"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "rigsmith", "artifact", "save", "--kind", "deform-layer", "--target", "body", "--scene", "s.json",
            "out.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Artifact {
                action: ArtifactCommand::Save { kind, targets, .. },
            } => {
                assert_eq!(kind, ArtifactKind::DeformLayer);
                assert_eq!(targets, vec!["body".to_string()]);
            }
            _ => panic!("expected artifact save"),
        }
    }
}
