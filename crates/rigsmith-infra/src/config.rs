//! Global configuration loader for Rigsmith.
//!
//! Reads `rigsmith.toml` from the rig environment root and deserializes it
//! into [`GlobalConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use rigsmith_types::config::{CONFIG_FILE_NAME, GlobalConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Read and parse a config file, with no fallback.
pub async fn read_config(path: &Path) -> Result<GlobalConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load configuration from `{env_root}/rigsmith.toml`.
///
/// - Missing file: [`GlobalConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_global_config(env_root: &Path) -> GlobalConfig {
    let config_path = env_root.join(CONFIG_FILE_NAME);

    if !tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
        tracing::debug!("No {CONFIG_FILE_NAME} found at {}, using defaults", config_path.display());
        return GlobalConfig::default();
    }

    match read_config(&config_path).await {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            GlobalConfig::default()
        }
    }
}

/// The per-user archetype directory, `{config_dir}/rigsmith/archetypes`.
pub fn user_archetype_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rigsmith").join("archetypes"))
}

/// Archetype search directories in priority order.
///
/// Configured paths come first (relative ones resolve against `env_root`),
/// then the user directory.
pub fn archetype_search_paths(config: &GlobalConfig, env_root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = config
        .archetype_paths
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { env_root.join(p) })
        .collect();
    if let Some(user_dir) = user_archetype_dir() {
        if !paths.contains(&user_dir) {
            paths.push(user_dir);
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config, GlobalConfig::default());
    }

    #[tokio::test]
    async fn test_load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"
archetype_paths = ["studio/archetypes"]
control_tag = "anim_ctl"
hook_timeout_secs = 30
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.control_tag, "anim_ctl");
        assert_eq!(config.hook_timeout_secs, 30);
        assert_eq!(config.root_component_type, "main.main");
    }

    #[tokio::test]
    async fn test_load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE_NAME), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config, GlobalConfig::default());

        let err = read_config(&tmp.path().join(CONFIG_FILE_NAME)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_search_paths_resolve_relative_and_end_with_user_dir() {
        let config = GlobalConfig {
            archetype_paths: vec![PathBuf::from("archetypes"), PathBuf::from("/studio/archetypes")],
            ..GlobalConfig::default()
        };
        let paths = archetype_search_paths(&config, Path::new("/rigs/hero"));
        assert_eq!(paths[0], PathBuf::from("/rigs/hero/archetypes"));
        assert_eq!(paths[1], PathBuf::from("/studio/archetypes"));
        if let Some(user_dir) = user_archetype_dir() {
            assert_eq!(paths.last(), Some(&user_dir));
        }
    }
}
