//! Rig description files (`*.rig`, JSON).

use std::fs;
use std::path::{Path, PathBuf};

use rigsmith_types::error::RigFileError;
use rigsmith_types::rig::{RIG_FILE_EXTENSION, RigDescription};

use crate::atomic::write_atomic;

pub fn load_rig(path: &Path) -> Result<RigDescription, RigFileError> {
    let content = fs::read_to_string(path).map_err(|e| RigFileError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let rig: RigDescription = serde_json::from_str(&content).map_err(|e| RigFileError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!(
        path = %path.display(),
        rig = %rig.rig_name,
        components = rig.components.len(),
        "loaded rig file"
    );
    Ok(rig)
}

/// Write `rig` atomically. Unknown fields read from disk are written back.
pub fn save_rig(path: &Path, rig: &RigDescription) -> Result<(), RigFileError> {
    let write_err = |message: String| RigFileError::Write {
        path: path.to_path_buf(),
        message,
    };
    let mut json = serde_json::to_string_pretty(rig).map_err(|e| write_err(e.to_string()))?;
    json.push('\n');
    write_atomic(path, json.as_bytes()).map_err(|e| write_err(e.to_string()))?;
    tracing::debug!(path = %path.display(), rig = %rig.rig_name, "saved rig file");
    Ok(())
}

/// First `*.rig` file in `dir`, in lexical order.
pub fn find_rig_file(dir: &Path) -> Result<PathBuf, RigFileError> {
    let entries = fs::read_dir(dir).map_err(|e| RigFileError::Read {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut rigs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == RIG_FILE_EXTENSION))
        .collect();
    rigs.sort();
    rigs.into_iter()
        .next()
        .ok_or_else(|| RigFileError::NoRigFile(dir.to_path_buf()))
}

/// Accept either a rig file or a rig environment directory.
pub fn locate_rig(path: &Path) -> Result<PathBuf, RigFileError> {
    if path.is_dir() {
        find_rig_file(path)
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigsmith_types::rig::ComponentRecord;
    use tempfile::tempdir;

    const HERO_RIG: &str = r#"{
  "rig_name": "hero",
  "archetype_parent": "biped",
  "studio_ticket": "RIG-42",
  "components": {
    "main": {"type": "main.main"},
    "spine": {"type": "chain.chain", "input": ["spine_1", "spine_2"], "rigParent": "trs_motion", "notes": "keep"},
    "arm_l": {"type": "basic.basic", "input": "shoulder_l"}
  }
}"#;

    #[test]
    fn test_round_trip_keeps_order_and_unknown_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hero.rig");
        fs::write(&path, HERO_RIG).unwrap();

        let rig = load_rig(&path).unwrap();
        let names: Vec<&str> = rig.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main", "spine", "arm_l"]);
        assert_eq!(rig.archetype_parent, vec!["biped".to_string()]);

        let copy = dir.path().join("copy.rig");
        save_rig(&copy, &rig).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&copy).unwrap()).unwrap();
        assert_eq!(value["studio_ticket"], "RIG-42");
        assert_eq!(value["components"]["spine"]["notes"], "keep");
        assert_eq!(load_rig(&copy).unwrap(), rig);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.rig");
        fs::write(&path, "{ rig_name: ").unwrap();
        let err = load_rig(&path).unwrap_err();
        assert!(matches!(err, RigFileError::Parse { .. }));
        assert!(err.to_string().contains("bad.rig"));
    }

    #[test]
    fn test_find_rig_file_in_environment() {
        let dir = tempdir().unwrap();
        assert!(matches!(find_rig_file(dir.path()), Err(RigFileError::NoRigFile(_))));

        let rig = RigDescription::new("hero").with_component(ComponentRecord::new("main", "main.main"));
        save_rig(&dir.path().join("hero.rig"), &rig).unwrap();
        fs::write(dir.path().join("readme.txt"), "x").unwrap();

        let found = locate_rig(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("hero.rig"));
        assert_eq!(load_rig(&found).unwrap().rig_name, "hero");
    }
}
