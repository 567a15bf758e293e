//! Archetype discovery and rig environment scaffolding.
//!
//! An archetype is a directory holding an `archetype.json` template, usually
//! next to the hook scripts it references and optionally a starter `.rig`
//! file. Layout:
//! ```text
//! {search_path}/{name}/
//!   archetype.json
//!   pre_scripts/...
//!   {name}.rig
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use rigsmith_core::archetype::ArchetypeLibrary;
use rigsmith_types::archetype::ArchetypeTemplate;
use rigsmith_types::error::RigFileError;
use rigsmith_types::rig::{RIG_FILE_EXTENSION, RigDescription};

use crate::rig_file::{find_rig_file, load_rig, save_rig};

pub const ARCHETYPE_FILE: &str = "archetype.json";

/// Read the template in `dir`. The name defaults to the directory name.
pub fn load_archetype(dir: &Path) -> Result<ArchetypeTemplate, RigFileError> {
    let path = dir.join(ARCHETYPE_FILE);
    let content = fs::read_to_string(&path).map_err(|e| RigFileError::Read {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let mut template: ArchetypeTemplate =
        serde_json::from_str(&content).map_err(|e| RigFileError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
    if template.name.is_empty() {
        template.name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    template.source_dir = Some(dir.to_path_buf());
    Ok(template)
}

/// Archetype directories directly under `root`, in lexical order.
pub fn archetype_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.join(ARCHETYPE_FILE).is_file())
        .collect();
    dirs.sort();
    dirs
}

/// Load every archetype found under `search_paths`.
///
/// Earlier search paths take precedence: a name already loaded is not
/// replaced by a later directory. Unreadable templates are skipped with a
/// warning.
pub fn load_library(search_paths: &[PathBuf]) -> ArchetypeLibrary {
    let mut library = ArchetypeLibrary::new();
    for root in search_paths {
        for dir in archetype_dirs(root) {
            match load_archetype(&dir) {
                Ok(template) if library.get(&template.name).is_some() => {
                    tracing::debug!(
                        archetype = %template.name,
                        path = %dir.display(),
                        "archetype already loaded from an earlier search path"
                    );
                }
                Ok(template) => library.insert(template),
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "skipping archetype");
                }
            }
        }
    }
    tracing::debug!(archetypes = library.len(), "loaded archetype library");
    library
}

/// Create `{target_dir}/{rig_name}/` from an archetype.
///
/// Copies the archetype directory (minus its template file), renames its rig
/// file to `{rig_name}.rig` and rewrites `rig_name` inside it. An archetype
/// without a rig file gets a fresh one inheriting from it. Returns the path
/// of the new rig file.
pub fn create_rig_env(
    template: &ArchetypeTemplate,
    target_dir: &Path,
    rig_name: &str,
) -> Result<PathBuf, RigFileError> {
    let env_root = target_dir.join(rig_name);
    if env_root.exists() {
        return Err(RigFileError::Write {
            path: env_root,
            message: "target already exists".to_string(),
        });
    }

    if let Some(source) = &template.source_dir {
        copy_tree(source, &env_root)?;
    } else {
        fs::create_dir_all(&env_root).map_err(|e| RigFileError::Write {
            path: env_root.clone(),
            message: e.to_string(),
        })?;
    }

    let rig_file = env_root.join(format!("{rig_name}.{RIG_FILE_EXTENSION}"));
    let mut rig = match find_rig_file(&env_root) {
        Ok(copied) => {
            if copied != rig_file {
                fs::rename(&copied, &rig_file).map_err(|e| RigFileError::Write {
                    path: rig_file.clone(),
                    message: e.to_string(),
                })?;
            }
            load_rig(&rig_file)?
        }
        Err(RigFileError::NoRigFile(_)) => {
            let mut rig = RigDescription::new(rig_name);
            rig.archetype_parent = vec![template.name.clone()];
            rig
        }
        Err(e) => return Err(e),
    };
    rig.rig_name = rig_name.to_string();
    save_rig(&rig_file, &rig)?;

    tracing::info!(
        archetype = %template.name,
        path = %env_root.display(),
        "created rig environment"
    );
    Ok(rig_file)
}

fn copy_tree(source: &Path, target: &Path) -> Result<(), RigFileError> {
    let write_err = |path: &Path, e: std::io::Error| RigFileError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    fs::create_dir_all(target).map_err(|e| write_err(target, e))?;
    let entries = fs::read_dir(source).map_err(|e| RigFileError::Read {
        path: source.to_path_buf(),
        message: e.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| write_err(source, e))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else if entry.file_name() != ARCHETYPE_FILE {
            fs::copy(&from, &to).map_err(|e| write_err(&to, e))?;
        }
    }
    Ok(())
}
