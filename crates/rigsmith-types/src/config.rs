//! Global configuration types for rigsmith.
//!
//! `GlobalConfig` represents the `rigsmith.toml` found at the root of a rig
//! environment. Every field has a default, so an empty or missing file is a
//! valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File name looked up in the rig environment root.
pub const CONFIG_FILE_NAME: &str = "rigsmith.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Extra archetype search directories, searched before the user directory.
    #[serde(default)]
    pub archetype_paths: Vec<PathBuf>,

    /// Component type forced first in build order.
    #[serde(default = "default_root_component_type")]
    pub root_component_type: String,

    /// Tag marking user-facing controls for publishing.
    #[serde(default = "default_control_tag")]
    pub control_tag: String,

    /// Kill hook processes that run longer than this.
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,

    /// Keep numbered copies of every publish under `versions/`.
    #[serde(default = "default_publish_versioning")]
    pub publish_versioning: bool,
}

fn default_root_component_type() -> String {
    "main.main".to_string()
}

fn default_control_tag() -> String {
    "control".to_string()
}

fn default_hook_timeout_secs() -> u64 {
    300
}

fn default_publish_versioning() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            archetype_paths: Vec::new(),
            root_component_type: default_root_component_type(),
            control_tag: default_control_tag(),
            hook_timeout_secs: default_hook_timeout_secs(),
            publish_versioning: default_publish_versioning(),
        }
    }
}
