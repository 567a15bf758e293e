//! Component trait and runtime instances.
//!
//! A component type implements [`Component`]: one method per build stage,
//! each defaulting to a no-op. [`ComponentInstance`] wraps the boxed behavior
//! with everything the pipeline tracks per component (record, state,
//! container, control map) and runs the shared per-stage steps around the
//! type-specific ones.

use std::collections::BTreeMap;

use rigsmith_types::build::{BuildStage, ComponentState};
use rigsmith_types::error::ComponentError;
use rigsmith_types::rig::ComponentRecord;
use semver::Version;
use serde_json::{Value, json};

use crate::container::{COMPONENT_TYPE_ATTR, Container, VERSION_ATTR};
use crate::scene::Scene;

/// Control-map key of the component's top node.
pub const ROOT_KEY: &str = "root";

/// Tag applied to guide nodes.
pub const GUIDE_TAG: &str = "guide";

/// Attribute holding a node's position.
pub const TRANSLATE_ATTR: &str = "translate";

// ---------------------------------------------------------------------------
// Component trait
// ---------------------------------------------------------------------------

/// Behavior of one component type.
///
/// Every method runs with the component's container active: nodes created
/// through [`StageContext`] are owned by it.
pub trait Component: Send {
    /// Create the component's top node. Runs once, at the start of `Build`.
    fn initial_hierarchy(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let root = cx.create_node("cmpt", None)?;
        cx.set_root(&root);
        Ok(())
    }

    fn initialize(&mut self, _cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn guide(&mut self, _cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn build(&mut self, _cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn connect(&mut self, _cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn finalize(&mut self, _cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn optimize(&mut self, _cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// What a component sees while one of its stage methods runs.
pub struct StageContext<'a> {
    pub record: &'a ComponentRecord,
    pub scene: &'a mut dyn Scene,
    pub container: &'a Container,
    controls: &'a mut BTreeMap<String, String>,
    control_tag: &'a str,
}

impl<'a> StageContext<'a> {
    pub fn new(
        record: &'a ComponentRecord,
        scene: &'a mut dyn Scene,
        container: &'a Container,
        controls: &'a mut BTreeMap<String, String>,
        control_tag: &'a str,
    ) -> Self {
        Self {
            record,
            scene,
            container,
            controls,
            control_tag,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Create a node named `{component}_{local}` in the container.
    pub fn create_node(&mut self, local: &str, parent: Option<&str>) -> Result<String, ComponentError> {
        let name = self.container.qualify(local);
        self.container.add_node(&mut *self.scene, &name, parent)
    }

    /// Create a node with an exact (unqualified) name in the container.
    pub fn create_named_node(
        &mut self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, ComponentError> {
        self.container.add_node(&mut *self.scene, name, parent)
    }

    /// Create a user-facing control and register it under `key`.
    pub fn create_control(
        &mut self,
        key: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, ComponentError> {
        let node = self.container.add_node(&mut *self.scene, name, parent)?;
        self.scene.add_tag(&node, self.control_tag)?;
        self.controls.insert(key.to_string(), node.clone());
        Ok(node)
    }

    /// Create a guide node `{component}_{local}` and register it under `key`.
    pub fn create_guide(
        &mut self,
        key: &str,
        local: &str,
        parent: Option<&str>,
    ) -> Result<String, ComponentError> {
        let node = self.create_node(local, parent)?;
        self.scene.add_tag(&node, GUIDE_TAG)?;
        self.controls.insert(key.to_string(), node.clone());
        Ok(node)
    }

    pub fn set_root(&mut self, node: &str) {
        self.controls.insert(ROOT_KEY.to_string(), node.to_string());
    }

    pub fn root(&self) -> Option<&str> {
        self.control(ROOT_KEY)
    }

    pub fn control(&self, key: &str) -> Option<&str> {
        self.controls.get(key).map(String::as_str)
    }

    pub fn set_attr(&mut self, node: &str, attr: &str, value: Value) -> Result<(), ComponentError> {
        Ok(self.scene.set_attr(node, attr, value)?)
    }

    /// Position of `node`, or the origin if it has none.
    pub fn translate_of(&self, node: &str) -> Value {
        self.scene
            .attr(node, TRANSLATE_ATTR)
            .unwrap_or_else(|| json!([0.0, 0.0, 0.0]))
    }

    /// Fail with [`ComponentError::UnresolvedReference`] unless `reference` exists.
    pub fn require(&self, reference: &str) -> Result<(), ComponentError> {
        if self.scene.exists(reference) {
            Ok(())
        } else {
            Err(ComponentError::UnresolvedReference {
                component: self.record.name.clone(),
                reference: reference.to_string(),
            })
        }
    }

    pub fn param_f64(&self, key: &str, default: f64) -> Result<f64, ComponentError> {
        match self.record.param(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| self.invalid(key, "expected a number")),
        }
    }

    pub fn param_bool(&self, key: &str, default: bool) -> Result<bool, ComponentError> {
        match self.record.param(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| self.invalid(key, "expected a boolean")),
        }
    }

    pub fn param_str(&self, key: &str, default: &str) -> Result<String, ComponentError> {
        match self.record.param(key) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    /// A [`ComponentError::BuildFailure`] attributed to this component.
    pub fn failure(&self, reason: impl Into<String>) -> ComponentError {
        ComponentError::BuildFailure {
            component: self.record.name.clone(),
            reason: reason.into(),
        }
    }

    fn invalid(&self, key: &str, reason: &str) -> ComponentError {
        ComponentError::InvalidParameter {
            component: self.record.name.clone(),
            parameter: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentInstance
// ---------------------------------------------------------------------------

/// Runtime object built from a [`ComponentRecord`].
pub struct ComponentInstance {
    record: ComponentRecord,
    type_version: Version,
    state: ComponentState,
    container: Option<Container>,
    controls: BTreeMap<String, String>,
    behavior: Box<dyn Component>,
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.record.name)
            .field("type", &self.record.component_type)
            .field("state", &self.state)
            .finish()
    }
}

impl ComponentInstance {
    pub fn new(record: ComponentRecord, type_version: Version, behavior: Box<dyn Component>) -> Self {
        Self {
            record,
            type_version,
            state: ComponentState::Unbuilt,
            container: None,
            controls: BTreeMap::new(),
            behavior,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &ComponentRecord {
        &self.record
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn controls(&self) -> &BTreeMap<String, String> {
        &self.controls
    }

    pub fn root(&self) -> Option<&str> {
        self.controls.get(ROOT_KEY).map(String::as_str)
    }

    /// Pick up state left in the scene by an earlier session.
    ///
    /// Returns `true` if a container with a recorded build step was found.
    pub fn restore(&mut self, scene: &dyn Scene) -> bool {
        let Some(container) = Container::open(scene, &self.record.name) else {
            return false;
        };
        let step = container.step(scene);
        if step == ComponentState::Unbuilt {
            return false;
        }
        self.state = step;
        self.controls = container.stashed_controls(scene);
        self.container = Some(container);
        true
    }

    /// Parent the component's top node under a resolved `rigParent` target.
    pub fn attach_to(&self, scene: &mut dyn Scene, target: &str) -> Result<(), ComponentError> {
        let root = self.root().ok_or_else(|| ComponentError::BuildFailure {
            component: self.record.name.clone(),
            reason: "component has no root node to attach".to_string(),
        })?;
        scene.set_parent(root, Some(target))?;
        Ok(())
    }

    /// Run one stage: the shared pipeline steps plus the type's own method.
    ///
    /// On success the new state is stamped on the container together with the
    /// current control map.
    pub fn run_stage(
        &mut self,
        stage: BuildStage,
        scene: &mut dyn Scene,
        rig_container: &str,
        control_tag: &str,
    ) -> Result<(), ComponentError> {
        if stage == BuildStage::Initialize && self.container.is_none() {
            let container = Container::create(&mut *scene, &self.record.name, Some(rig_container))?;
            container.set_meta(&mut *scene, COMPONENT_TYPE_ATTR, json!(self.record.component_type))?;
            container.set_meta(&mut *scene, VERSION_ATTR, json!(self.type_version.to_string()))?;
            self.container = Some(container);
        }
        let Some(container) = self.container.as_ref() else {
            return Err(ComponentError::BuildFailure {
                component: self.record.name.clone(),
                reason: format!("cannot run {stage} before initialize"),
            });
        };

        if stage == BuildStage::Build {
            for input in &self.record.input {
                if !scene.exists(input) {
                    return Err(ComponentError::UnresolvedReference {
                        component: self.record.name.clone(),
                        reference: input.clone(),
                    });
                }
            }
        }

        {
            let mut cx = StageContext::new(
                &self.record,
                &mut *scene,
                container,
                &mut self.controls,
                control_tag,
            );
            match stage {
                BuildStage::Initialize => self.behavior.initialize(&mut cx)?,
                BuildStage::Guide => self.behavior.guide(&mut cx)?,
                BuildStage::Build => {
                    if cx.root().is_none() {
                        self.behavior.initial_hierarchy(&mut cx)?;
                    }
                    self.behavior.build(&mut cx)?;
                }
                BuildStage::Connect => self.behavior.connect(&mut cx)?,
                BuildStage::Finalize => {
                    let root = cx.root().map(str::to_string);
                    container.publish_nodes(&mut *cx.scene, control_tag, root.as_deref())?;
                    container.sanity_check(&mut *cx.scene);
                    self.behavior.finalize(&mut cx)?;
                }
                BuildStage::Optimize => self.behavior.optimize(&mut cx)?,
            }
        }

        let state = stage.component_state();
        container.stash_controls(&mut *scene, &self.controls)?;
        container.set_step(&mut *scene, state)?;
        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;

    struct Probe;

    impl Component for Probe {
        fn guide(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            cx.create_guide("guide", "guide", None)?;
            Ok(())
        }

        fn build(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            let root = cx.root().map(str::to_string);
            let size = cx.param_f64("size", 1.0)?;
            let ctl = cx.create_control("ctl", "probe_ctl", root.as_deref())?;
            cx.set_attr(&ctl, "size", json!(size))
        }
    }

    fn instance(record: ComponentRecord) -> ComponentInstance {
        ComponentInstance::new(record, Version::new(1, 0, 0), Box::new(Probe))
    }

    fn rig_scene() -> MemoryScene {
        let mut scene = MemoryScene::new();
        scene.create_node("test_rig", None).unwrap();
        scene
    }

    #[test]
    fn test_stages_stamp_step_and_create_nodes_in_container() {
        let mut scene = rig_scene();
        let mut inst = instance(ComponentRecord::new("probe", "test.probe").with_param("size", json!(2.0)));

        for stage in [BuildStage::Initialize, BuildStage::Guide, BuildStage::Build] {
            inst.run_stage(stage, &mut scene, "test_rig", "control").unwrap();
        }

        assert_eq!(inst.state(), ComponentState::Built);
        let container = inst.container().unwrap();
        assert_eq!(container.step(&scene), ComponentState::Built);
        assert_eq!(inst.root(), Some("probe_cmpt"));
        assert!(container.owns(&scene, "probe_ctl"));
        assert!(scene.has_tag("probe_ctl", "control"));
        assert!(scene.has_tag("probe_guide", GUIDE_TAG));
        assert_eq!(scene.attr("probe_ctl", "size"), Some(json!(2.0)));
        assert_eq!(scene.parent("probe_container").as_deref(), Some("test_rig"));
    }

    #[test]
    fn test_build_requires_inputs_to_exist() {
        let mut scene = rig_scene();
        let mut inst = instance(ComponentRecord::new("probe", "test.probe").with_input(["missing_jnt"]));
        inst.run_stage(BuildStage::Initialize, &mut scene, "test_rig", "control").unwrap();
        inst.run_stage(BuildStage::Guide, &mut scene, "test_rig", "control").unwrap();

        let err = inst
            .run_stage(BuildStage::Build, &mut scene, "test_rig", "control")
            .unwrap_err();
        assert!(matches!(
            err,
            ComponentError::UnresolvedReference { ref reference, .. } if reference == "missing_jnt"
        ));
        assert_eq!(inst.state(), ComponentState::Guided);
    }

    #[test]
    fn test_restore_reads_back_state_and_controls() {
        let mut scene = rig_scene();
        let record = ComponentRecord::new("probe", "test.probe");
        let mut first = instance(record.clone());
        for stage in [BuildStage::Initialize, BuildStage::Guide, BuildStage::Build] {
            first.run_stage(stage, &mut scene, "test_rig", "control").unwrap();
        }

        let mut resumed = instance(record);
        assert!(resumed.restore(&scene));
        assert_eq!(resumed.state(), ComponentState::Built);
        assert_eq!(resumed.controls().get("ctl").map(String::as_str), Some("probe_ctl"));
    }

    #[test]
    fn test_invalid_parameter_type_is_reported() {
        let mut scene = rig_scene();
        let mut inst = instance(ComponentRecord::new("probe", "test.probe").with_param("size", json!("big")));
        inst.run_stage(BuildStage::Initialize, &mut scene, "test_rig", "control").unwrap();
        inst.run_stage(BuildStage::Guide, &mut scene, "test_rig", "control").unwrap();
        let err = inst
            .run_stage(BuildStage::Build, &mut scene, "test_rig", "control")
            .unwrap_err();
        assert!(matches!(err, ComponentError::InvalidParameter { .. }));
    }
}
