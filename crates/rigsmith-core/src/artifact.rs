//! Data artifact port and per-kind handlers.
//!
//! An artifact is scene data captured to disk and re-applied on rebuild
//! (joint layouts, guide positions, control shapes, skin weights and so on).
//! Each [`ArtifactKind`] has an [`ArtifactHandler`] that knows how to gather
//! that data from the scene, validate it against the scene, and apply it.
//! Storage is behind the [`ArtifactStore`] trait; the filesystem store lives
//! in `rigsmith-infra`.
//!
//! Handlers validate every target before mutating anything, so a single file
//! is applied completely or not at all.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rigsmith_types::artifact::{
    ARTIFACT_SCHEMA_VERSION, ArtifactEnvelope, ArtifactKind, LoadSummary, SkippedArtifact,
};
use rigsmith_types::error::ArtifactError;
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use serde_json::{Map, Value, json};

use crate::component::TRANSLATE_ATTR;
use crate::scene::Scene;

/// Tag applied to joints created from skeleton data.
pub const JOINT_TAG: &str = "joint";

/// Attribute holding skin cluster data on a mesh node.
pub const SKIN_ATTR: &str = "skin_cluster";

// ---------------------------------------------------------------------------
// Store port
// ---------------------------------------------------------------------------

/// Persistence for artifacts.
pub trait ArtifactStore {
    /// Gather `kind` data for `targets` and write it to `path`.
    fn save(
        &self,
        scene: &dyn Scene,
        kind: ArtifactKind,
        targets: &[String],
        path: &Path,
    ) -> Result<PathBuf, ArtifactError>;

    /// Read and apply `kind` data from a file, or from every `*.json` file in
    /// a directory.
    fn load(
        &mut self,
        scene: &mut dyn Scene,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<LoadSummary, ArtifactError>;

    /// Every artifact skipped by directory loads so far.
    fn skipped(&self) -> &[SkippedArtifact];
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

pub trait ArtifactHandler: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    /// Schema versions this handler can read.
    fn supported_versions(&self) -> VersionReq {
        caret(1)
    }

    fn gather(&self, scene: &dyn Scene, targets: &[String]) -> Result<Value, ArtifactError>;

    /// Check `data` can be applied to `scene` without mutating it.
    fn validate(&self, scene: &dyn Scene, data: &Value) -> Result<(), ArtifactError>;

    /// Apply validated data. Returns the number of nodes touched.
    fn apply(&self, scene: &mut dyn Scene, data: &Value) -> Result<usize, ArtifactError>;
}

fn caret(major: u64) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Caret,
            major,
            minor: None,
            patch: None,
            pre: Prerelease::EMPTY,
        }],
    }
}

fn invalid(kind: ArtifactKind, reason: impl Into<String>) -> ArtifactError {
    ArtifactError::InvalidData {
        kind,
        reason: reason.into(),
    }
}

/// The object stored under `key` in `data`.
fn section<'a>(kind: ArtifactKind, data: &'a Value, key: &str) -> Result<&'a Map<String, Value>, ArtifactError> {
    data.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(kind, format!("missing '{key}' object")))
}

// ---------------------------------------------------------------------------
// Skeleton
// ---------------------------------------------------------------------------

/// Joint hierarchy: `{"joints": {name: {"parent": name|null, "translate": [x, y, z]}}}`.
pub struct SkeletonHandler;

impl SkeletonHandler {
    /// Joints ordered so every parent comes before its children.
    fn placement_order<'a>(
        scene: &dyn Scene,
        joints: &'a Map<String, Value>,
    ) -> Result<Vec<(&'a str, Option<&'a str>)>, ArtifactError> {
        let kind = ArtifactKind::Skeleton;
        let mut pending: Vec<(&str, Option<&str>)> = Vec::with_capacity(joints.len());
        for (name, joint) in joints {
            let parent = match joint.get("parent") {
                None | Some(Value::Null) => None,
                Some(Value::String(p)) => Some(p.as_str()),
                Some(_) => return Err(invalid(kind, format!("joint '{name}' has a non-string parent"))),
            };
            if let Some(parent) = parent {
                if !joints.contains_key(parent) && !scene.exists(parent) {
                    return Err(ArtifactError::MissingTarget {
                        kind,
                        node: parent.to_string(),
                    });
                }
            }
            pending.push((name.as_str(), parent));
        }

        let mut placed: Vec<(&str, Option<&str>)> = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let before = pending.len();
            let mut i = 0;
            while i < pending.len() {
                let (_, parent) = pending[i];
                let ready = match parent {
                    Some(p) if joints.contains_key(p) => placed.iter().any(|(n, _)| *n == p),
                    _ => true,
                };
                if ready {
                    placed.push(pending.remove(i));
                } else {
                    i += 1;
                }
            }
            if pending.len() == before {
                let names: Vec<&str> = pending.iter().map(|(n, _)| *n).collect();
                return Err(invalid(kind, format!("joint parents form a cycle: {}", names.join(", "))));
            }
        }
        Self::check_final_hierarchy(scene, &placed)?;
        Ok(placed)
    }

    /// Rejects joints that would end up under themselves once the file's
    /// parents are layered over the scene's existing hierarchy.
    fn check_final_hierarchy(
        scene: &dyn Scene,
        placed: &[(&str, Option<&str>)],
    ) -> Result<(), ArtifactError> {
        let file_parents: HashMap<&str, Option<&str>> = placed.iter().copied().collect();
        let final_parent = |node: &str| -> Option<String> {
            match file_parents.get(node) {
                Some(parent) => parent.map(str::to_string),
                None => scene.parent(node),
            }
        };

        for (name, parent) in placed {
            let mut seen: HashSet<String> = HashSet::new();
            let mut current = parent.map(str::to_string);
            while let Some(node) = current {
                if node == *name {
                    return Err(invalid(
                        ArtifactKind::Skeleton,
                        format!(
                            "joint '{name}' would be parented under its own descendant '{}'",
                            parent.unwrap_or_default()
                        ),
                    ));
                }
                if !seen.insert(node.clone()) {
                    break;
                }
                current = final_parent(&node);
            }
        }
        Ok(())
    }

    fn collect(scene: &dyn Scene, node: &str, joints: &mut Map<String, Value>) {
        if joints.contains_key(node) {
            return;
        }
        let mut joint = Map::new();
        joint.insert("parent".to_string(), json!(scene.parent(node)));
        if let Some(translate) = scene.attr(node, TRANSLATE_ATTR) {
            joint.insert(TRANSLATE_ATTR.to_string(), translate);
        }
        joints.insert(node.to_string(), Value::Object(joint));
        for child in scene.children(node) {
            Self::collect(scene, &child, joints);
        }
    }
}

impl ArtifactHandler for SkeletonHandler {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Skeleton
    }

    /// Targets and all of their descendants.
    fn gather(&self, scene: &dyn Scene, targets: &[String]) -> Result<Value, ArtifactError> {
        let mut joints = Map::new();
        for target in targets {
            if !scene.exists(target) {
                return Err(ArtifactError::MissingTarget {
                    kind: self.kind(),
                    node: target.clone(),
                });
            }
            Self::collect(scene, target, &mut joints);
        }
        // A gathered root keeps no parent outside the captured set.
        for target in targets {
            if let Some(Value::Object(joint)) = joints.get_mut(target.as_str()) {
                joint.insert("parent".to_string(), Value::Null);
            }
        }
        Ok(json!({ "joints": joints }))
    }

    fn validate(&self, scene: &dyn Scene, data: &Value) -> Result<(), ArtifactError> {
        let joints = section(self.kind(), data, "joints")?;
        Self::placement_order(scene, joints).map(|_| ())
    }

    fn apply(&self, scene: &mut dyn Scene, data: &Value) -> Result<usize, ArtifactError> {
        let joints = section(self.kind(), data, "joints")?;
        let order = Self::placement_order(&*scene, joints)?;
        // Existing joints start detached so a reparent never passes through
        // a hierarchy that only exists halfway through the load.
        for (name, _) in &order {
            if scene.exists(name) {
                scene.set_parent(name, None)?;
            }
        }
        for (name, parent) in &order {
            if scene.exists(name) {
                scene.set_parent(name, *parent)?;
            } else {
                scene.create_node(name, *parent)?;
            }
            scene.add_tag(name, JOINT_TAG)?;
            if let Some(translate) = joints.get(*name).and_then(|j| j.get(TRANSLATE_ATTR)) {
                scene.set_attr(name, TRANSLATE_ATTR, translate.clone())?;
            }
        }
        Ok(order.len())
    }
}

// ---------------------------------------------------------------------------
// Per-node attributes
// ---------------------------------------------------------------------------

/// Named attributes on existing nodes: `{"nodes": {name: {attr: value}}}`.
///
/// Serves every kind whose data is a fixed attribute set per node.
pub struct NodeAttrHandler {
    kind: ArtifactKind,
    attrs: &'static [&'static str],
}

impl NodeAttrHandler {
    pub fn new(kind: ArtifactKind, attrs: &'static [&'static str]) -> Self {
        Self { kind, attrs }
    }

    pub fn attrs(&self) -> &[&'static str] {
        self.attrs
    }
}

impl ArtifactHandler for NodeAttrHandler {
    fn kind(&self) -> ArtifactKind {
        self.kind
    }

    fn gather(&self, scene: &dyn Scene, targets: &[String]) -> Result<Value, ArtifactError> {
        let mut nodes = Map::new();
        for target in targets {
            if !scene.exists(target) {
                return Err(ArtifactError::MissingTarget {
                    kind: self.kind,
                    node: target.clone(),
                });
            }
            let values: Map<String, Value> = self
                .attrs
                .iter()
                .filter_map(|attr| scene.attr(target, attr).map(|v| (attr.to_string(), v)))
                .collect();
            if !values.is_empty() {
                nodes.insert(target.clone(), Value::Object(values));
            }
        }
        Ok(json!({ "nodes": nodes }))
    }

    fn validate(&self, scene: &dyn Scene, data: &Value) -> Result<(), ArtifactError> {
        let nodes = section(self.kind, data, "nodes")?;
        for (node, values) in nodes {
            if !scene.exists(node) {
                return Err(ArtifactError::MissingTarget {
                    kind: self.kind,
                    node: node.clone(),
                });
            }
            let values = values
                .as_object()
                .ok_or_else(|| invalid(self.kind, format!("entry for '{node}' is not an object")))?;
            if let Some(unknown) = values.keys().find(|k| !self.attrs.contains(&k.as_str())) {
                return Err(invalid(
                    self.kind,
                    format!("unknown attribute '{unknown}' on '{node}'"),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, scene: &mut dyn Scene, data: &Value) -> Result<usize, ArtifactError> {
        let nodes = section(self.kind, data, "nodes")?;
        for (node, values) in nodes {
            if let Some(values) = values.as_object() {
                for (attr, value) in values {
                    scene.set_attr(node, attr, value.clone())?;
                }
            }
        }
        Ok(nodes.len())
    }
}

// ---------------------------------------------------------------------------
// Skin
// ---------------------------------------------------------------------------

/// Skin weights: `{"skins": {mesh: {"influences": [joint], "weights": [[f64]]}}}`.
///
/// Every weight row holds one value per influence.
pub struct SkinHandler;

impl ArtifactHandler for SkinHandler {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Skin
    }

    fn gather(&self, scene: &dyn Scene, targets: &[String]) -> Result<Value, ArtifactError> {
        let mut skins = Map::new();
        for target in targets {
            match scene.attr(target, SKIN_ATTR) {
                Some(skin) => {
                    skins.insert(target.clone(), skin);
                }
                None if scene.exists(target) => {
                    tracing::warn!(node = %target, "node has no skin cluster, skipping");
                }
                None => {
                    return Err(ArtifactError::MissingTarget {
                        kind: self.kind(),
                        node: target.clone(),
                    });
                }
            }
        }
        Ok(json!({ "skins": skins }))
    }

    fn validate(&self, scene: &dyn Scene, data: &Value) -> Result<(), ArtifactError> {
        let kind = self.kind();
        let skins = section(kind, data, "skins")?;
        for (mesh, skin) in skins {
            if !scene.exists(mesh) {
                return Err(ArtifactError::MissingTarget {
                    kind,
                    node: mesh.clone(),
                });
            }
            let influences = skin
                .get("influences")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid(kind, format!("skin on '{mesh}' has no influences")))?;
            for influence in influences {
                let joint = influence
                    .as_str()
                    .ok_or_else(|| invalid(kind, format!("non-string influence on '{mesh}'")))?;
                if !scene.exists(joint) {
                    return Err(ArtifactError::MissingTarget {
                        kind,
                        node: joint.to_string(),
                    });
                }
            }
            let weights = skin
                .get("weights")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid(kind, format!("skin on '{mesh}' has no weights")))?;
            for (row, weight) in weights.iter().enumerate() {
                let ok = weight
                    .as_array()
                    .is_some_and(|w| w.len() == influences.len() && w.iter().all(Value::is_number));
                if !ok {
                    return Err(invalid(
                        kind,
                        format!(
                            "weight row {row} on '{mesh}' must hold {} numbers",
                            influences.len()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply(&self, scene: &mut dyn Scene, data: &Value) -> Result<usize, ArtifactError> {
        let skins = section(self.kind(), data, "skins")?;
        for (mesh, skin) in skins {
            scene.set_attr(mesh, SKIN_ATTR, skin.clone())?;
        }
        Ok(skins.len())
    }
}

// ---------------------------------------------------------------------------
// Handler set
// ---------------------------------------------------------------------------

/// One handler per artifact kind.
pub struct ArtifactHandlers {
    handlers: HashMap<ArtifactKind, Box<dyn ArtifactHandler>>,
}

impl Default for ArtifactHandlers {
    fn default() -> Self {
        Self::standard()
    }
}

impl ArtifactHandlers {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Handlers for every builtin kind.
    pub fn standard() -> Self {
        let mut handlers = Self::empty();
        handlers.register(Box::new(SkeletonHandler));
        handlers.register(Box::new(SkinHandler));
        handlers.register(Box::new(NodeAttrHandler::new(ArtifactKind::Guide, &[TRANSLATE_ATTR])));
        handlers.register(Box::new(NodeAttrHandler::new(ArtifactKind::Curve, &["shape", "color"])));
        handlers.register(Box::new(NodeAttrHandler::new(ArtifactKind::Deformer, &["deformer"])));
        handlers.register(Box::new(NodeAttrHandler::new(ArtifactKind::DeformLayer, &["deform_layer"])));
        handlers.register(Box::new(NodeAttrHandler::new(ArtifactKind::Shape, &["blend_shape"])));
        handlers.register(Box::new(NodeAttrHandler::new(ArtifactKind::Pose, &["pose"])));
        handlers
    }

    pub fn register(&mut self, handler: Box<dyn ArtifactHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: ArtifactKind) -> Result<&dyn ArtifactHandler, ArtifactError> {
        self.handlers
            .get(&kind)
            .map(|h| h.as_ref())
            .ok_or(ArtifactError::NoHandler(kind))
    }

    /// Gather `kind` data for `targets` into a new envelope.
    pub fn make_envelope(
        &self,
        scene: &dyn Scene,
        kind: ArtifactKind,
        targets: &[String],
        user: &str,
    ) -> Result<ArtifactEnvelope, ArtifactError> {
        let data = self.get(kind)?.gather(scene, targets)?;
        Ok(ArtifactEnvelope {
            user: user.to_string(),
            kind,
            time: Utc::now(),
            schema_version: ARTIFACT_SCHEMA_VERSION.to_string(),
            data,
        })
    }

    /// Check an envelope read from `path` and apply it.
    ///
    /// Fails without touching the scene on a kind mismatch, an unsupported
    /// schema version, or data that does not validate.
    pub fn apply_envelope(
        &self,
        scene: &mut dyn Scene,
        expected: ArtifactKind,
        path: &Path,
        envelope: &ArtifactEnvelope,
    ) -> Result<usize, ArtifactError> {
        if envelope.kind != expected {
            return Err(ArtifactError::KindMismatch {
                path: path.to_path_buf(),
                expected,
                found: envelope.kind,
            });
        }
        let handler = self.get(expected)?;
        let supported = handler.supported_versions();
        let compatible = Version::parse(&envelope.schema_version)
            .map(|v| supported.matches(&v))
            .unwrap_or(false);
        if !compatible {
            return Err(ArtifactError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: envelope.schema_version.clone(),
                supported: supported.to_string(),
            });
        }
        handler.validate(&*scene, &envelope.data)?;
        handler.apply(scene, &envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;

    fn envelope(kind: ArtifactKind, version: &str, data: Value) -> ArtifactEnvelope {
        ArtifactEnvelope {
            user: "tester".into(),
            kind,
            time: Utc::now(),
            schema_version: version.into(),
            data,
        }
    }

    #[test]
    fn test_skeleton_applies_children_after_parents() {
        let mut scene = MemoryScene::new();
        let data = json!({"joints": {
            "spine_2": {"parent": "spine_1", "translate": [0.0, 20.0, 0.0]},
            "spine_1": {"parent": "root_jnt", "translate": [0.0, 10.0, 0.0]},
            "root_jnt": {"parent": null}
        }});
        let handlers = ArtifactHandlers::standard();
        let touched = handlers
            .apply_envelope(&mut scene, ArtifactKind::Skeleton, Path::new("s.json"), &envelope(ArtifactKind::Skeleton, "1.0.0", data))
            .unwrap();
        assert_eq!(touched, 3);
        assert_eq!(scene.parent("spine_2").as_deref(), Some("spine_1"));
        assert!(scene.has_tag("root_jnt", JOINT_TAG));
        assert_eq!(scene.attr("spine_1", TRANSLATE_ATTR), Some(json!([0.0, 10.0, 0.0])));
    }

    #[test]
    fn test_skeleton_reparent_under_own_child_changes_nothing() {
        let mut scene = MemoryScene::new();
        scene.create_node("x", None).unwrap();
        scene.create_node("y", Some("x")).unwrap();
        let data = json!({"joints": {
            "a_new": {"parent": null},
            "x": {"parent": "y"}
        }});
        let handlers = ArtifactHandlers::standard();
        let err = handlers
            .apply_envelope(&mut scene, ArtifactKind::Skeleton, Path::new("s.json"), &envelope(ArtifactKind::Skeleton, "1.0.0", data))
            .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidData { .. }));
        assert!(!scene.exists("a_new"));
        assert_eq!(scene.parent("y").as_deref(), Some("x"));
        assert_eq!(scene.parent("x"), None);
    }

    #[test]
    fn test_skeleton_reorders_existing_hierarchy() {
        // n -> m -> k in the scene; the file flips it to m -> k -> p -> n.
        let mut scene = MemoryScene::new();
        scene.create_node("n", None).unwrap();
        scene.create_node("m", Some("n")).unwrap();
        scene.create_node("k", Some("m")).unwrap();
        let data = json!({"joints": {
            "p": {"parent": "k"},
            "n": {"parent": "p"},
            "m": {"parent": null}
        }});
        let touched = SkeletonHandler.apply(&mut scene, &data).unwrap();
        assert_eq!(touched, 3);
        assert_eq!(scene.parent("m"), None);
        assert_eq!(scene.parent("k").as_deref(), Some("m"));
        assert_eq!(scene.parent("p").as_deref(), Some("k"));
        assert_eq!(scene.parent("n").as_deref(), Some("p"));
    }

    #[test]
    fn test_skeleton_gather_captures_descendants() {
        let mut scene = MemoryScene::new();
        scene.create_node("world", None).unwrap();
        scene.create_node("hip", Some("world")).unwrap();
        scene.create_node("knee", Some("hip")).unwrap();
        let data = SkeletonHandler.gather(&scene, &["hip".to_string()]).unwrap();
        assert_eq!(data["joints"]["hip"]["parent"], Value::Null);
        assert_eq!(data["joints"]["knee"]["parent"], json!("hip"));
        assert!(data["joints"].get("world").is_none());
    }

    #[test]
    fn test_unsupported_version_leaves_scene_untouched() {
        let mut scene = MemoryScene::new();
        scene.create_node("arm_ctl", None).unwrap();
        let handlers = ArtifactHandlers::standard();
        let env = envelope(
            ArtifactKind::Curve,
            "2.0.0",
            json!({"nodes": {"arm_ctl": {"shape": "circle"}}}),
        );
        let err = handlers
            .apply_envelope(&mut scene, ArtifactKind::Curve, Path::new("c.json"), &env)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedVersion { ref found, .. } if found == "2.0.0"));
        assert_eq!(scene.attr("arm_ctl", "shape"), None);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let mut scene = MemoryScene::new();
        let handlers = ArtifactHandlers::standard();
        let env = envelope(ArtifactKind::Pose, "1.0.0", json!({"nodes": {}}));
        let err = handlers
            .apply_envelope(&mut scene, ArtifactKind::Skin, Path::new("p.json"), &env)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::KindMismatch { .. }));
    }

    #[test]
    fn test_node_attrs_validate_every_target_before_applying() {
        let mut scene = MemoryScene::new();
        scene.create_node("a_ctl", None).unwrap();
        let handlers = ArtifactHandlers::standard();
        let env = envelope(
            ArtifactKind::Curve,
            "1.0.0",
            json!({"nodes": {"a_ctl": {"shape": "square"}, "b_ctl": {"shape": "circle"}}}),
        );
        let err = handlers
            .apply_envelope(&mut scene, ArtifactKind::Curve, Path::new("c.json"), &env)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::MissingTarget { ref node, .. } if node == "b_ctl"));
        assert_eq!(scene.attr("a_ctl", "shape"), None);
    }

    #[test]
    fn test_skin_rows_must_match_influences() {
        let mut scene = MemoryScene::new();
        for node in ["body_geo", "hip", "knee"] {
            scene.create_node(node, None).unwrap();
        }
        let bad = json!({"skins": {"body_geo": {"influences": ["hip", "knee"], "weights": [[1.0, 0.0], [0.5]]}}});
        assert!(matches!(
            SkinHandler.validate(&scene, &bad),
            Err(ArtifactError::InvalidData { .. })
        ));

        let good = json!({"skins": {"body_geo": {"influences": ["hip", "knee"], "weights": [[1.0, 0.0], [0.5, 0.5]]}}});
        SkinHandler.validate(&scene, &good).unwrap();
        assert_eq!(SkinHandler.apply(&mut scene, &good).unwrap(), 1);
        let gathered = SkinHandler.gather(&scene, &["body_geo".to_string()]).unwrap();
        assert_eq!(gathered["skins"]["body_geo"]["influences"], json!(["hip", "knee"]));
    }

    #[test]
    fn test_envelope_carries_gathered_data() {
        let mut scene = MemoryScene::new();
        scene.create_node("arm_guide_0", None).unwrap();
        scene.set_attr("arm_guide_0", TRANSLATE_ATTR, json!([1.0, 2.0, 3.0])).unwrap();
        let env = ArtifactHandlers::standard()
            .make_envelope(&scene, ArtifactKind::Guide, &["arm_guide_0".to_string()], "rigger")
            .unwrap();
        assert_eq!(env.schema_version, ARTIFACT_SCHEMA_VERSION);
        assert_eq!(env.data["nodes"]["arm_guide_0"]["translate"], json!([1.0, 2.0, 3.0]));
    }
}
