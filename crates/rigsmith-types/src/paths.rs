//! Rig environment paths.
//!
//! Two environment variables identify the active rig file and the rig
//! environment root. Relative artifact and hook paths resolve against the
//! environment root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Path of the active rig file.
pub const RIG_FILE_VAR: &str = "RIGSMITH_FILE";

/// Root directory of the active rig environment.
pub const RIG_ENV_VAR: &str = "RIGSMITH_ENV";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigPaths {
    pub rig_file: Option<PathBuf>,
    pub env_root: PathBuf,
}

impl RigPaths {
    /// Paths for a rig file; the environment root is the file's directory.
    pub fn for_rig_file(rig_file: impl Into<PathBuf>) -> Self {
        let rig_file = rig_file.into();
        let env_root = rig_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            rig_file: Some(rig_file),
            env_root,
        }
    }

    pub fn for_env_root(env_root: impl Into<PathBuf>) -> Self {
        Self {
            rig_file: None,
            env_root: env_root.into(),
        }
    }

    /// Resolve `path` against the environment root unless it is absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.env_root.join(path)
        }
    }

    /// `(name, value)` pairs to export to child processes.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![(RIG_ENV_VAR, self.env_root.display().to_string())];
        if let Some(file) = &self.rig_file {
            vars.push((RIG_FILE_VAR, file.display().to_string()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_resolve_against_env_root() {
        let paths = RigPaths::for_rig_file("/rigs/hero/hero.rig");
        assert_eq!(paths.env_root, PathBuf::from("/rigs/hero"));
        assert_eq!(paths.resolve("skins"), PathBuf::from("/rigs/hero/skins"));
        assert_eq!(paths.resolve("/abs/x.json"), PathBuf::from("/abs/x.json"));
    }

    #[test]
    fn test_env_vars_include_rig_file_when_known() {
        let vars = RigPaths::for_rig_file("/rigs/hero/hero.rig").env_vars();
        assert!(vars.iter().any(|(k, v)| *k == RIG_FILE_VAR && v == "/rigs/hero/hero.rig"));
        let vars = RigPaths::for_env_root("/rigs/hero").env_vars();
        assert_eq!(vars.len(), 1);
    }
}
