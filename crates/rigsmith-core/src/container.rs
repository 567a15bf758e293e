//! Component containers.
//!
//! Every component owns one container node (`{component}_container`). Nodes
//! created through the container are owned by it, which is what catches name
//! collisions between sibling components and scopes publish and query
//! operations. The container node also carries the component's persisted
//! metadata: its `build_step`, type and version, and the stashed control map
//! a resumed session reads back.

use std::collections::BTreeMap;

use rigsmith_types::build::ComponentState;
use rigsmith_types::error::{ComponentError, SceneError};
use serde_json::{Value, json};

use crate::scene::Scene;

pub const CONTAINER_SUFFIX: &str = "_container";

/// Tag identifying container nodes.
pub const CONTAINER_TAG: &str = "container";

pub const BUILD_STEP_ATTR: &str = "build_step";
pub const COMPONENT_TYPE_ATTR: &str = "component_type";
pub const VERSION_ATTR: &str = "__version__";
pub const CONTROLS_ATTR: &str = "controls";
pub const PUBLISHED_ATTR: &str = "published";
pub const PARENT_ANCHOR_ATTR: &str = "parent_anchor";
pub const CHILD_ANCHOR_ATTR: &str = "child_anchor";

/// Owner reported when a colliding node belongs to no container.
const SCENE_OWNER: &str = "<scene>";

/// Interaction preferences normalized by [`Container::sanity_check`].
const NORMALIZED_PREFERENCES: [(&str, bool); 4] = [
    ("useAssets", false),
    ("containerAtTop", false),
    ("containerCentricSelection", false),
    ("showContainerContents", false),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    owner: String,
    node: String,
}

impl Container {
    pub fn node_name(owner: &str) -> String {
        format!("{owner}{CONTAINER_SUFFIX}")
    }

    /// Create the container for `owner`, or reuse it if it already exists.
    pub fn create(
        scene: &mut dyn Scene,
        owner: &str,
        parent: Option<&str>,
    ) -> Result<Self, ComponentError> {
        if let Some(existing) = Self::open(scene, owner) {
            return Ok(existing);
        }
        let node = Self::node_name(owner);
        if scene.exists(&node) {
            return Err(ComponentError::NameCollision {
                owner: scene
                    .container_of(&node)
                    .unwrap_or_else(|| SCENE_OWNER.to_string()),
                node,
            });
        }
        scene.create_node(&node, parent)?;
        scene.add_tag(&node, CONTAINER_TAG)?;
        Ok(Self {
            owner: owner.to_string(),
            node,
        })
    }

    /// Look up an existing container for `owner`.
    pub fn open(scene: &dyn Scene, owner: &str) -> Option<Self> {
        let node = Self::node_name(owner);
        scene.has_tag(&node, CONTAINER_TAG).then(|| Self {
            owner: owner.to_string(),
            node,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Prefix `local` with the owner name unless it already carries it.
    pub fn qualify(&self, local: &str) -> String {
        let prefix = format!("{}_", self.owner);
        if local.starts_with(&prefix) {
            local.to_string()
        } else {
            format!("{prefix}{local}")
        }
    }

    /// Create `name` inside this container.
    ///
    /// Re-adding a node this container already owns returns it unchanged, so
    /// a re-run stage does not duplicate nodes. A node owned elsewhere (or by
    /// no container) is a [`ComponentError::NameCollision`].
    pub fn add_node(
        &self,
        scene: &mut dyn Scene,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, ComponentError> {
        if scene.exists(name) {
            return match scene.container_of(name) {
                Some(owner) if owner == self.node => Ok(name.to_string()),
                owner => Err(ComponentError::NameCollision {
                    node: name.to_string(),
                    owner: owner.unwrap_or_else(|| SCENE_OWNER.to_string()),
                }),
            };
        }
        scene.create_node(name, parent)?;
        scene.assign_container(name, Some(&self.node))?;
        Ok(name.to_string())
    }

    pub fn owns(&self, scene: &dyn Scene, node: &str) -> bool {
        scene.container_of(node).as_deref() == Some(self.node.as_str())
    }

    pub fn nodes(&self, scene: &dyn Scene) -> Vec<String> {
        scene.nodes_in_container(&self.node)
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    pub fn step(&self, scene: &dyn Scene) -> ComponentState {
        scene
            .attr(&self.node, BUILD_STEP_ATTR)
            .and_then(|v| v.as_u64())
            .and_then(ComponentState::from_step)
            .unwrap_or(ComponentState::Unbuilt)
    }

    pub fn set_step(&self, scene: &mut dyn Scene, state: ComponentState) -> Result<(), SceneError> {
        scene.set_attr(&self.node, BUILD_STEP_ATTR, json!(state.step()))
    }

    pub fn set_meta(&self, scene: &mut dyn Scene, key: &str, value: Value) -> Result<(), SceneError> {
        scene.set_attr(&self.node, key, value)
    }

    pub fn meta(&self, scene: &dyn Scene, key: &str) -> Option<Value> {
        scene.attr(&self.node, key)
    }

    pub fn stash_controls(
        &self,
        scene: &mut dyn Scene,
        controls: &BTreeMap<String, String>,
    ) -> Result<(), SceneError> {
        scene.set_attr(&self.node, CONTROLS_ATTR, json!(controls))
    }

    pub fn stashed_controls(&self, scene: &dyn Scene) -> BTreeMap<String, String> {
        self.meta(scene, CONTROLS_ATTR)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Finalize-time operations
    // -----------------------------------------------------------------------

    /// Publish the user-facing controls of this container.
    ///
    /// Filters the owned nodes down to those tagged `control_tag`, records the
    /// list on the container, and anchors the component root. Returns the
    /// published nodes.
    pub fn publish_nodes(
        &self,
        scene: &mut dyn Scene,
        control_tag: &str,
        root: Option<&str>,
    ) -> Result<Vec<String>, SceneError> {
        if let Some(root) = root {
            scene.set_attr(&self.node, PARENT_ANCHOR_ATTR, json!(root))?;
            scene.set_attr(&self.node, CHILD_ANCHOR_ATTR, json!(root))?;
        }
        let published: Vec<String> = self
            .nodes(scene)
            .into_iter()
            .filter(|n| scene.has_tag(n, control_tag))
            .collect();
        scene.set_attr(&self.node, PUBLISHED_ATTR, json!(published))?;
        tracing::debug!(
            container = %self.node,
            published = published.len(),
            "published container nodes"
        );
        Ok(published)
    }

    pub fn published(&self, scene: &dyn Scene) -> Vec<String> {
        self.meta(scene, PUBLISHED_ATTR)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Normalize host interaction preferences so containers behave the same
    /// regardless of the user's settings.
    pub fn sanity_check(&self, scene: &mut dyn Scene) {
        for (key, value) in NORMALIZED_PREFERENCES {
            scene.set_preference(key, json!(value));
        }
    }

    /// Delete every owned node and the container itself.
    ///
    /// Returns the number of nodes removed, including the container.
    pub fn destroy(self, scene: &mut dyn Scene) -> Result<usize, SceneError> {
        let nodes = self.nodes(scene);
        let mut removed = 0;
        for node in nodes {
            if scene.exists(&node) {
                scene.delete_node(&node)?;
                removed += 1;
            }
        }
        scene.delete_node(&self.node)?;
        tracing::debug!(container = %self.node, removed, "destroyed container");
        Ok(removed + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;

    fn scene_with(owner: &str) -> (MemoryScene, Container) {
        let mut scene = MemoryScene::new();
        let container = Container::create(&mut scene, owner, None).unwrap();
        (scene, container)
    }

    #[test]
    fn test_create_is_idempotent() {
        let (mut scene, container) = scene_with("arm_l");
        assert_eq!(container.node(), "arm_l_container");
        let again = Container::create(&mut scene, "arm_l", None).unwrap();
        assert_eq!(again, container);
    }

    #[test]
    fn test_create_collides_with_untagged_node_of_same_name() {
        let mut scene = MemoryScene::new();
        scene.create_node("leg_container", None).unwrap();
        let err = Container::create(&mut scene, "leg", None).unwrap_err();
        assert!(matches!(err, ComponentError::NameCollision { .. }));
    }

    #[test]
    fn test_qualify_prefixes_once() {
        let (_, container) = scene_with("spine");
        assert_eq!(container.qualify("fk_0_ctl"), "spine_fk_0_ctl");
        assert_eq!(container.qualify("spine_fk_0_ctl"), "spine_fk_0_ctl");
    }

    #[test]
    fn test_sibling_containers_cannot_claim_the_same_node() {
        let mut scene = MemoryScene::new();
        let a = Container::create(&mut scene, "a", None).unwrap();
        let b = Container::create(&mut scene, "b", None).unwrap();
        a.add_node(&mut scene, "shared_ctl", None).unwrap();

        // Same container re-adding is a no-op.
        assert_eq!(a.add_node(&mut scene, "shared_ctl", None).unwrap(), "shared_ctl");

        match b.add_node(&mut scene, "shared_ctl", None).unwrap_err() {
            ComponentError::NameCollision { node, owner } => {
                assert_eq!(node, "shared_ctl");
                assert_eq!(owner, "a_container");
            }
            other => panic!("expected NameCollision, got {other:?}"),
        }
    }

    #[test]
    fn test_publish_filters_to_control_tagged_nodes() {
        let (mut scene, container) = scene_with("cog");
        let root = container.add_node(&mut scene, "cog_cmpt", None).unwrap();
        let ctl = container.add_node(&mut scene, "cog_ctl", Some(&root)).unwrap();
        container.add_node(&mut scene, "cog_offset", Some(&ctl)).unwrap();
        scene.add_tag(&ctl, "control").unwrap();

        let published = container.publish_nodes(&mut scene, "control", Some(&root)).unwrap();
        assert_eq!(published, vec!["cog_ctl".to_string()]);
        assert_eq!(container.published(&scene), published);
        assert_eq!(container.meta(&scene, PARENT_ANCHOR_ATTR), Some(json!("cog_cmpt")));
    }

    #[test]
    fn test_step_and_controls_persist_on_container() {
        let (mut scene, container) = scene_with("neck");
        assert_eq!(container.step(&scene), ComponentState::Unbuilt);
        container.set_step(&mut scene, ComponentState::Built).unwrap();

        let mut controls = BTreeMap::new();
        controls.insert("root".to_string(), "neck_cmpt".to_string());
        container.stash_controls(&mut scene, &controls).unwrap();

        let reopened = Container::open(&scene, "neck").unwrap();
        assert_eq!(reopened.step(&scene), ComponentState::Built);
        assert_eq!(reopened.stashed_controls(&scene), controls);
    }

    #[test]
    fn test_sanity_check_normalizes_preferences() {
        let (mut scene, container) = scene_with("jaw");
        scene.set_preference("containerCentricSelection", json!(true));
        container.sanity_check(&mut scene);
        assert_eq!(scene.preference("containerCentricSelection"), Some(json!(false)));
        assert_eq!(scene.preference("useAssets"), Some(json!(false)));
    }

    #[test]
    fn test_destroy_removes_owned_nodes_only() {
        let (mut scene, container) = scene_with("hand");
        scene.create_node("hand_jnt", None).unwrap();
        container.add_node(&mut scene, "hand_ctl", None).unwrap();
        container.add_node(&mut scene, "hand_grp", None).unwrap();

        let removed = container.destroy(&mut scene).unwrap();
        assert_eq!(removed, 3);
        assert!(scene.exists("hand_jnt"));
        assert!(!scene.exists("hand_ctl"));
        assert!(!scene.exists("hand_container"));
    }
}
