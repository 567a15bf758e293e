//! `main.main`: the rig root.
//!
//! Creates the top node named after the component, the `rig`, `bind` and
//! `model` groups, and the global control stack
//! `trs_global > trs_shot > trs_motion` that every other component hangs off.

use rigsmith_types::error::ComponentError;
use rigsmith_types::rig::ComponentRecord;
use semver::Version;
use serde_json::json;

use crate::component::{Component, StageContext};
use crate::registry::ComponentType;

const GROUPS: [&str; 3] = ["rig", "bind", "model"];
const CONTROLS: [&str; 3] = ["trs_global", "trs_shot", "trs_motion"];

pub fn component_type() -> ComponentType {
    ComponentType {
        id: "main.main",
        version: Version::new(1, 0, 0),
        description: "Rig root with rig/bind/model groups and global transform controls",
        defaults: super::common_defaults(),
        outputs,
        factory: |_| Ok(Box::new(MainComponent)),
    }
}

fn outputs(_record: &ComponentRecord) -> Vec<String> {
    CONTROLS
        .iter()
        .chain(GROUPS.iter())
        .map(|s| s.to_string())
        .collect()
}

struct MainComponent;

impl Component for MainComponent {
    fn initial_hierarchy(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let name = cx.name().to_string();
        let root = cx.create_named_node(&name, None)?;
        cx.set_root(&root);
        Ok(())
    }

    fn build(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let root = cx
            .root()
            .map(str::to_string)
            .ok_or_else(|| cx.failure("root node missing"))?;
        for group in GROUPS {
            cx.create_named_node(group, Some(&root))?;
        }

        let size = cx.param_f64("size", 1.0)?;
        let mut parent = "rig".to_string();
        for (level, control) in CONTROLS.iter().enumerate() {
            let node = cx.create_control(control, control, Some(&parent))?;
            // Each level down the stack is drawn a little smaller.
            cx.set_attr(&node, "size", json!(size * (1.0 - 0.1 * level as f64)))?;
            parent = node;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::scene::{MemoryScene, Scene};
    use std::collections::BTreeMap;

    #[test]
    fn test_builds_groups_and_control_stack() {
        let mut scene = MemoryScene::new();
        let record = ComponentRecord::new("main", "main.main");
        let container = Container::create(&mut scene, "main", None).unwrap();
        let mut controls = BTreeMap::new();
        let mut cx = StageContext::new(&record, &mut scene, &container, &mut controls, "control");

        let mut main = MainComponent;
        main.initial_hierarchy(&mut cx).unwrap();
        main.build(&mut cx).unwrap();

        assert_eq!(scene.parent("rig").as_deref(), Some("main"));
        assert_eq!(scene.parent("trs_global").as_deref(), Some("rig"));
        assert_eq!(scene.parent("trs_motion").as_deref(), Some("trs_shot"));
        assert!(scene.has_tag("trs_motion", "control"));
        assert!(container.owns(&scene, "model"));
        assert_eq!(controls.get("trs_global").map(String::as_str), Some("trs_global"));
    }

    #[test]
    fn test_outputs_cover_controls_and_groups() {
        let out = outputs(&ComponentRecord::new("main", "main.main"));
        assert!(out.contains(&"trs_motion".to_string()));
        assert!(out.contains(&"bind".to_string()));
        assert_eq!(out.len(), 6);
    }
}
