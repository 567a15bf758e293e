//! Build orchestrator: drives a [`BuildSession`] through the stage pipeline.
//!
//! # Stage flow
//!
//! 1. `Initialize`: instantiate every component (all before the first scene
//!    mutation), create the rig container and one container per component,
//!    restore state stamped by an earlier session, load `Initialize` artifacts.
//! 2. `Guide`: create guides, run `pre` hooks, load `Guide` artifacts.
//! 3. `Build`: construct each component inside its container, load `Build`
//!    artifacts.
//! 4. `Connect`: attach every component under its `rigParent`, run the
//!    type-specific connect step, load `Connect` artifacts, run `post` hooks.
//! 5. `Finalize`: publish controls, sanity-check containers, stamp rig
//!    metadata, load `Finalize` artifacts, run `pub` hooks.
//! 6. `Optimize` (optional).
//!
//! Components run one at a time in build order. The first failure aborts the
//! session: the rest of that stage and every later stage are skipped, and
//! whatever completed stays in the scene.

use chrono::Utc;
use rigsmith_types::archetype::{HookKind, HookRef};
use rigsmith_types::artifact::SkippedArtifact;
use rigsmith_types::build::{BuildReport, BuildStage, EntryOutcome, SessionOutcome, SessionState, Subject};
use rigsmith_types::error::{ArchetypeError, ArtifactError, ComponentError, ResolveError};
use rigsmith_types::event::BuildEvent;
use rigsmith_types::paths::RigPaths;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::artifact::ArtifactStore;
use crate::container::Container;
use crate::event::EventBus;
use crate::hook::{HookInvocation, HookRunner};
use crate::registry::ComponentRegistry;
use crate::scene::Scene;
use crate::session::BuildSession;

/// Tag identifying the top-level rig container.
pub const RIG_TAG: &str = "rig";

pub const TOOL_VERSION_ATTR: &str = "__tool_version__";
pub const BUILD_USER_ATTR: &str = "__build_user__";
pub const BUILD_TIME_ATTR: &str = "__build_time__";
pub const SESSION_ID_ATTR: &str = "__session_id__";
pub const ARCHETYPES_ATTR: &str = "__archetypes__";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that stop a build before it starts.
///
/// Failures once the pipeline is running are not errors: they abort the
/// session and are reported in the [`BuildReport`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("cannot run stage '{stage}' from session state '{from}'")]
    InvalidTransition { from: SessionState, stage: BuildStage },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Archetype(#[from] ArchetypeError),
}

// ---------------------------------------------------------------------------
// Context and settings
// ---------------------------------------------------------------------------

/// The ports a build runs against.
pub struct BuildContext<'a> {
    pub scene: &'a mut dyn Scene,
    pub artifacts: &'a mut dyn ArtifactStore,
    pub hooks: &'a mut dyn HookRunner,
    pub paths: RigPaths,
    pub cancel: CancellationToken,
    pub events: Option<EventBus>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Tag marking user-facing controls for publishing.
    pub control_tag: String,
    pub tool_version: String,
    pub build_user: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let build_user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            control_tag: "control".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            build_user,
        }
    }
}

/// Why a stage stopped.
struct Abort {
    subject: Subject,
    error: String,
    outcome: EntryOutcome,
}

impl Abort {
    fn failed(subject: Subject, error: impl ToString) -> Self {
        Self {
            subject,
            error: error.to_string(),
            outcome: EntryOutcome::Failed,
        }
    }

    fn cancelled(next: &str) -> Self {
        Self {
            subject: Subject::Session,
            error: format!("build cancelled before '{next}'"),
            outcome: EntryOutcome::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// BuildOrchestrator
// ---------------------------------------------------------------------------

pub struct BuildOrchestrator<'r, 'c> {
    registry: &'r ComponentRegistry,
    cx: BuildContext<'c>,
    settings: OrchestratorSettings,
}

impl<'r, 'c> BuildOrchestrator<'r, 'c> {
    pub fn new(registry: &'r ComponentRegistry, cx: BuildContext<'c>) -> Self {
        Self {
            registry,
            cx,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run `stages` in order.
    ///
    /// The whole sequence is checked against the session state machine first;
    /// an illegal transition fails with [`OrchestratorError::InvalidTransition`]
    /// before anything runs. Otherwise the returned report carries the
    /// outcome, including an abort.
    pub fn run(
        &mut self,
        session: &mut BuildSession,
        stages: &[BuildStage],
    ) -> Result<BuildReport, OrchestratorError> {
        let mut state = session.state();
        for &stage in stages {
            state = state
                .advance(stage)
                .ok_or(OrchestratorError::InvalidTransition { from: state, stage })?;
        }

        for (position, &stage) in stages.iter().enumerate() {
            tracing::info!(session_id = %session.id(), stage = %stage, "stage started");
            self.emit(BuildEvent::StageStarted {
                session_id: session.id(),
                stage,
                components: session.records().len(),
            });

            match self.run_stage(session, stage) {
                Ok(()) => {
                    if let Some(next) = session.state().advance(stage) {
                        session.set_state(next);
                    }
                    self.emit(BuildEvent::StageFinished {
                        session_id: session.id(),
                        stage,
                    });
                }
                Err(abort) => {
                    tracing::error!(
                        session_id = %session.id(),
                        stage = %stage,
                        subject = %abort.subject,
                        error = %abort.error,
                        "build aborted"
                    );
                    session.record(stage, abort.subject.clone(), abort.outcome, Some(abort.error.clone()));
                    session.abort(stage, abort.subject, abort.error);
                    for &later in &stages[position + 1..] {
                        session.record(
                            later,
                            Subject::Session,
                            EntryOutcome::Skipped,
                            Some(format!("not run: session aborted at {stage}")),
                        );
                    }
                    break;
                }
            }
        }

        let report = session.report();
        self.emit(BuildEvent::SessionFinished {
            session_id: session.id(),
            outcome: report.outcome,
        });
        if report.outcome == SessionOutcome::Succeeded {
            tracing::info!(session_id = %session.id(), state = %report.state, "build finished");
        }
        Ok(report)
    }

    fn run_stage(&mut self, session: &mut BuildSession, stage: BuildStage) -> Result<(), Abort> {
        match stage {
            BuildStage::Initialize => {
                self.instantiate(session)?;
                self.ensure_rig_container(session)?;
                self.run_components(session, stage)?;
                self.load_artifacts(session, stage)?;
            }
            BuildStage::Guide => {
                let guided = self.run_components(session, stage)?;
                if guided > 0 {
                    self.run_hooks(session, HookKind::Pre, stage)?;
                } else {
                    tracing::debug!(session_id = %session.id(), "nothing guided, skipping pre hooks");
                }
                self.load_artifacts(session, stage)?;
            }
            BuildStage::Build | BuildStage::Optimize => {
                self.run_components(session, stage)?;
                self.load_artifacts(session, stage)?;
            }
            BuildStage::Connect => {
                self.run_components(session, stage)?;
                self.load_artifacts(session, stage)?;
                self.run_hooks(session, HookKind::Post, stage)?;
            }
            BuildStage::Finalize => {
                self.run_components(session, stage)?;
                self.stamp_rig_metadata(session)?;
                self.load_artifacts(session, stage)?;
                self.run_hooks(session, HookKind::Pub, stage)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Initialize helpers
    // -----------------------------------------------------------------------

    /// Build every instance, failing on the first bad record before any
    /// scene mutation. Then pick up state from a previous session.
    fn instantiate(&mut self, session: &mut BuildSession) -> Result<(), Abort> {
        let mut instances = Vec::with_capacity(session.records().len());
        for record in session.records() {
            let instance = self
                .registry
                .instantiate(record)
                .map_err(|e| Abort::failed(Subject::component(&record.name), e))?;
            instances.push(instance);
        }

        for instance in &mut instances {
            if instance.restore(&*self.cx.scene) {
                tracing::debug!(
                    session_id = %session.id(),
                    component = %instance.name(),
                    state = ?instance.state(),
                    "restored component state from scene"
                );
            }
        }
        session.instances = instances;
        Ok(())
    }

    fn ensure_rig_container(&mut self, session: &BuildSession) -> Result<(), Abort> {
        let name = session.container_name();
        let scene = &mut *self.cx.scene;
        if scene.exists(name) {
            return Ok(());
        }
        scene
            .create_node(name, None)
            .and_then(|_| scene.add_tag(name, RIG_TAG))
            .map_err(|e| Abort::failed(Subject::Session, e))
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Run `stage` for every component in order. Returns how many actually ran.
    fn run_components(&mut self, session: &mut BuildSession, stage: BuildStage) -> Result<usize, Abort> {
        let total = session.instances.len();
        let mut ran = 0;

        for index in 0..total {
            let name = session.instances[index].name().to_string();
            if self.cx.cancel.is_cancelled() {
                return Err(Abort::cancelled(&name));
            }

            let state = session.instances[index].state();
            if state.has_reached(stage) {
                tracing::debug!(
                    session_id = %session.id(),
                    stage = %stage,
                    component = %name,
                    "component already past stage, skipping"
                );
                session.record(
                    stage,
                    Subject::component(&name),
                    EntryOutcome::Skipped,
                    Some(format!("already {state:?}").to_lowercase()),
                );
                self.emit_component_finished(session, stage, &name, EntryOutcome::Skipped);
                continue;
            }

            self.emit(BuildEvent::ComponentStarted {
                session_id: session.id(),
                stage,
                component: name.clone(),
                index,
                total,
            });

            let result = if stage == BuildStage::Connect {
                self.attach_rig_parent(session, index)
                    .and_then(|_| self.run_component_stage(session, index, stage))
            } else {
                self.run_component_stage(session, index, stage)
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        session_id = %session.id(),
                        stage = %stage,
                        component = %name,
                        "component stage completed"
                    );
                    session.record(stage, Subject::component(&name), EntryOutcome::Completed, None);
                    self.emit_component_finished(session, stage, &name, EntryOutcome::Completed);
                    ran += 1;
                }
                Err(e) => {
                    self.emit_component_finished(session, stage, &name, EntryOutcome::Failed);
                    return Err(Abort::failed(Subject::component(&name), e));
                }
            }
        }
        Ok(ran)
    }

    fn run_component_stage(
        &mut self,
        session: &mut BuildSession,
        index: usize,
        stage: BuildStage,
    ) -> Result<(), ComponentError> {
        let container = session.container_name().to_string();
        session.instances[index].run_stage(
            stage,
            &mut *self.cx.scene,
            &container,
            &self.settings.control_tag,
        )
    }

    /// Parent a component under its `rigParent`.
    ///
    /// A reference naming another component's output must resolve to the
    /// node that component created. If the owner never created it but an
    /// unrelated node of that name exists, the reference is ambiguous.
    /// Anything else must simply exist in the scene.
    fn attach_rig_parent(&mut self, session: &BuildSession, index: usize) -> Result<(), ComponentError> {
        let instance = &session.instances[index];
        let record = instance.record();
        if !record.has_rig_parent() {
            return Ok(());
        }
        let reference = record.rig_parent.as_str();
        let scene = &mut *self.cx.scene;

        let unresolved = || ComponentError::UnresolvedReference {
            component: record.name.clone(),
            reference: reference.to_string(),
        };

        match session.output_owner(reference) {
            Some(owner) if owner != record.name => {
                let owner_container = Container::node_name(owner);
                if scene.container_of(reference).as_deref() == Some(owner_container.as_str()) {
                    // Owned output: fine.
                } else if scene.exists(reference) {
                    return Err(ComponentError::AmbiguousReference {
                        component: record.name.clone(),
                        reference: reference.to_string(),
                        owner: owner.to_string(),
                    });
                } else {
                    return Err(unresolved());
                }
            }
            _ if !scene.exists(reference) => return Err(unresolved()),
            _ => {}
        }

        instance.attach_to(scene, reference)?;
        tracing::debug!(
            session_id = %session.id(),
            component = %record.name,
            parent = %reference,
            "attached component"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    fn run_hooks(&mut self, session: &mut BuildSession, kind: HookKind, stage: BuildStage) -> Result<(), Abort> {
        let hooks: Vec<HookRef> = session.hooks().hooks(kind).to_vec();
        for hook in &hooks {
            if !hook.is_tagged() {
                self.run_hook(session, kind, stage, hook, None)?;
                continue;
            }
            let targets: Vec<String> = session
                .instances
                .iter()
                .filter(|i| hook.matches_tag(i.record().component_tag.as_deref()))
                .map(|i| i.name().to_string())
                .collect();
            if targets.is_empty() {
                session.record(
                    stage,
                    Subject::Hook {
                        path: hook.path.clone(),
                        component: None,
                    },
                    EntryOutcome::Skipped,
                    Some("no component matches the hook's tags".to_string()),
                );
                continue;
            }
            for target in &targets {
                self.run_hook(session, kind, stage, hook, Some(target))?;
            }
        }
        Ok(())
    }

    fn run_hook(
        &mut self,
        session: &mut BuildSession,
        kind: HookKind,
        stage: BuildStage,
        hook: &HookRef,
        component: Option<&str>,
    ) -> Result<(), Abort> {
        if self.cx.cancel.is_cancelled() {
            return Err(Abort::cancelled(&hook.to_string()));
        }
        let subject = Subject::Hook {
            path: hook.path.clone(),
            component: component.map(str::to_string),
        };
        self.emit(BuildEvent::HookStarted {
            session_id: session.id(),
            stage,
            kind,
            path: hook.to_string(),
        });

        let invocation = HookInvocation {
            kind,
            stage,
            component,
            paths: &self.cx.paths,
            session_id: session.id(),
            rig_name: session.rig_name(),
        };
        self.cx
            .hooks
            .run(hook, &invocation)
            .map_err(|e| Abort::failed(subject.clone(), e))?;

        tracing::info!(
            session_id = %session.id(),
            kind = %kind,
            hook = %hook,
            component,
            "hook completed"
        );
        session.record(stage, subject, EntryOutcome::Completed, None);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Load every artifact bound to `stage`.
    ///
    /// A missing path or a partially applied directory is a warning; any
    /// other failure aborts.
    fn load_artifacts(&mut self, session: &mut BuildSession, stage: BuildStage) -> Result<(), Abort> {
        let bindings: Vec<_> = session
            .artifacts()
            .iter()
            .filter(|b| b.stage() == stage)
            .cloned()
            .collect();

        for binding in bindings {
            if self.cx.cancel.is_cancelled() {
                return Err(Abort::cancelled(&binding.path));
            }
            let path = self.cx.paths.resolve(&binding.path);
            let subject = Subject::Artifact {
                kind: binding.kind,
                path: path.clone(),
            };

            match self.cx.artifacts.load(&mut *self.cx.scene, binding.kind, &path) {
                Ok(summary) if summary.is_partial() => {
                    tracing::warn!(
                        session_id = %session.id(),
                        kind = %binding.kind,
                        path = %path.display(),
                        applied = summary.applied.len(),
                        skipped = summary.skipped.len(),
                        "artifact directory partially applied"
                    );
                    session.record(
                        stage,
                        subject,
                        EntryOutcome::Warning,
                        Some(format!(
                            "applied {} files, skipped {}",
                            summary.applied.len(),
                            summary.skipped.len()
                        )),
                    );
                    session.skipped_artifacts.extend(summary.skipped);
                }
                Ok(summary) => {
                    tracing::info!(
                        session_id = %session.id(),
                        kind = %binding.kind,
                        path = %path.display(),
                        nodes = summary.nodes,
                        "artifact loaded"
                    );
                    session.record(
                        stage,
                        subject,
                        EntryOutcome::Completed,
                        Some(format!("{} nodes", summary.nodes)),
                    );
                }
                Err(ArtifactError::NotFound(missing)) => {
                    tracing::warn!(
                        session_id = %session.id(),
                        kind = %binding.kind,
                        path = %missing.display(),
                        "artifact not found, skipping"
                    );
                    let reason = "not found".to_string();
                    session.record(stage, subject, EntryOutcome::Warning, Some(reason.clone()));
                    session.skipped_artifacts.push(SkippedArtifact {
                        kind: binding.kind,
                        path: missing,
                        reason,
                    });
                }
                Err(e) => return Err(Abort::failed(subject, e)),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalize helpers
    // -----------------------------------------------------------------------

    fn stamp_rig_metadata(&mut self, session: &BuildSession) -> Result<(), Abort> {
        let rig = session.container_name();
        let values = [
            (TOOL_VERSION_ATTR, json!(self.settings.tool_version)),
            (BUILD_USER_ATTR, json!(self.settings.build_user)),
            (BUILD_TIME_ATTR, json!(Utc::now().to_rfc3339())),
            (SESSION_ID_ATTR, json!(session.id().to_string())),
            (ARCHETYPES_ATTR, json!(session.hooks().lineage)),
        ];
        for (attr, value) in values {
            self.cx
                .scene
                .set_attr(rig, attr, value)
                .map_err(|e| Abort::failed(Subject::Session, e))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    fn emit(&self, event: BuildEvent) {
        if let Some(bus) = &self.cx.events {
            bus.publish(event);
        }
    }

    fn emit_component_finished(&self, session: &BuildSession, stage: BuildStage, component: &str, outcome: EntryOutcome) {
        self.emit(BuildEvent::ComponentFinished {
            session_id: session.id(),
            stage,
            component: component.to_string(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use rigsmith_types::artifact::{ArtifactBinding, ArtifactKind, LoadSummary};
    use rigsmith_types::build::ComponentState;
    use rigsmith_types::error::HookError;
    use rigsmith_types::rig::{ComponentRecord, RigDescription};
    use semver::Version;
    use serde_json::{Map, Value};

    use crate::archetype::ArchetypeLibrary;
    use crate::component::{Component, GUIDE_TAG, StageContext};
    use crate::registry::ComponentType;
    use crate::scene::MemoryScene;

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    /// Creates a guide, then `{name}_out` at Build. Fails at the stage named
    /// by its `failAt` parameter.
    struct Probe {
        fail_at: Option<String>,
        skip_output: bool,
    }

    impl Probe {
        fn check(&self, stage: BuildStage, cx: &StageContext<'_>) -> Result<(), ComponentError> {
            if self.fail_at.as_deref() == Some(stage.as_str()) {
                return Err(cx.failure(format!("probe told to fail at {stage}")));
            }
            Ok(())
        }
    }

    impl Component for Probe {
        fn initialize(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            self.check(BuildStage::Initialize, cx)
        }

        fn guide(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            self.check(BuildStage::Guide, cx)?;
            cx.create_guide("guide", "guide", None)?;
            Ok(())
        }

        fn build(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            self.check(BuildStage::Build, cx)?;
            if !self.skip_output {
                let root = cx.root().map(str::to_string);
                let out = format!("{}_out", cx.name());
                cx.create_control("out", &out, root.as_deref())?;
            }
            Ok(())
        }

        fn connect(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            self.check(BuildStage::Connect, cx)
        }

        fn finalize(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
            self.check(BuildStage::Finalize, cx)
        }
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register(ComponentType {
            id: "test.probe",
            version: Version::new(1, 0, 0),
            description: "test probe",
            defaults: Map::new(),
            outputs: |record| vec![format!("{}_out", record.name)],
            factory: |record| {
                Ok(Box::new(Probe {
                    fail_at: record.param("failAt").and_then(Value::as_str).map(str::to_string),
                    skip_output: record.param("skipOutput").and_then(Value::as_bool).unwrap_or(false),
                }))
            },
        });
        registry
    }

    fn probe(name: &str) -> ComponentRecord {
        ComponentRecord::new(name, "test.probe")
    }

    /// Artifact store over in-memory data keyed by path; unknown paths are missing.
    #[derive(Default)]
    struct MemoryStore {
        files: HashMap<PathBuf, (ArtifactKind, Value)>,
        skipped: Vec<SkippedArtifact>,
    }

    impl ArtifactStore for MemoryStore {
        fn save(
            &self,
            _scene: &dyn Scene,
            _kind: ArtifactKind,
            _targets: &[String],
            path: &Path,
        ) -> Result<PathBuf, ArtifactError> {
            Ok(path.to_path_buf())
        }

        fn load(
            &mut self,
            scene: &mut dyn Scene,
            kind: ArtifactKind,
            path: &Path,
        ) -> Result<LoadSummary, ArtifactError> {
            let (_, data) = self
                .files
                .get(path)
                .ok_or_else(|| ArtifactError::NotFound(path.to_path_buf()))?;
            let nodes = data.as_object().map(|m| m.len()).unwrap_or(0);
            if let Some(map) = data.as_object() {
                for (node, value) in map {
                    scene.set_attr(node, "loaded", value.clone())?;
                }
            }
            let mut summary = LoadSummary::new(kind);
            summary.applied.push(path.to_path_buf());
            summary.nodes = nodes;
            Ok(summary)
        }

        fn skipped(&self) -> &[SkippedArtifact] {
            &self.skipped
        }
    }

    /// Records every hook call as `kind:path[:component]`.
    #[derive(Default)]
    struct RecordingHooks {
        calls: Vec<String>,
        fail: Option<PathBuf>,
    }

    impl HookRunner for RecordingHooks {
        fn run(&mut self, hook: &HookRef, invocation: &HookInvocation<'_>) -> Result<(), HookError> {
            let mut call = format!("{}:{}", invocation.kind, hook.path.display());
            if let Some(component) = invocation.component {
                call.push(':');
                call.push_str(component);
            }
            self.calls.push(call);
            if self.fail.as_deref() == Some(hook.path.as_path()) {
                return Err(HookError::Failed {
                    path: hook.path.clone(),
                    code: Some(1),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        scene: MemoryScene,
        store: MemoryStore,
        hooks: RecordingHooks,
        cancel: CancellationToken,
        registry: ComponentRegistry,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                scene: MemoryScene::new(),
                store: MemoryStore::default(),
                hooks: RecordingHooks::default(),
                cancel: CancellationToken::new(),
                registry: registry(),
            }
        }

        fn session(&self, rig: &RigDescription) -> BuildSession {
            BuildSession::prepare(rig, &self.registry, &ArchetypeLibrary::new(), None).unwrap()
        }

        fn run(&mut self, session: &mut BuildSession, stages: &[BuildStage]) -> Result<BuildReport, OrchestratorError> {
            let cx = BuildContext {
                scene: &mut self.scene,
                artifacts: &mut self.store,
                hooks: &mut self.hooks,
                paths: RigPaths::for_env_root("/rigs/test"),
                cancel: self.cancel.clone(),
                events: None,
            };
            BuildOrchestrator::new(&self.registry, cx).run(session, stages)
        }
    }

    fn five_component_rig(fail: &str, stage: &str) -> RigDescription {
        let mut rig = RigDescription::new("test");
        for name in ["a", "b", "c", "d", "e"] {
            let mut record = probe(name);
            if name == fail {
                record = record.with_param("failAt", json!(stage));
            }
            rig = rig.with_component(record);
        }
        rig
    }

    fn outcome_of(report: &BuildReport, stage: BuildStage, component: &str) -> Option<EntryOutcome> {
        report
            .entries_for(component)
            .find(|e| e.stage == stage)
            .map(|e| e.outcome)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_full_build_succeeds_and_stamps_everything() {
        let mut h = Harness::new();
        let rig = RigDescription::new("test")
            .with_component(probe("a"))
            .with_component(probe("b").with_rig_parent("a_out"));
        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        assert_eq!(report.outcome, SessionOutcome::Succeeded);
        assert_eq!(report.state, SessionState::Finalized);
        assert_eq!(report.order, vec!["a", "b"]);
        assert_eq!(h.scene.parent("b_cmpt").as_deref(), Some("a_out"));
        assert_eq!(h.scene.parent("a_container").as_deref(), Some("test_rig"));
        assert_eq!(h.scene.attr("b_container", "build_step"), Some(json!(5)));
        assert_eq!(h.scene.attr("a_container", "published"), Some(json!(["a_out"])));
        assert!(h.scene.attr("test_rig", SESSION_ID_ATTR).is_some());
        assert!(h.scene.has_tag("test_rig", RIG_TAG));
    }

    #[test]
    fn test_failure_in_build_aborts_and_preserves_prior_work() {
        let mut h = Harness::new();
        let mut session = h.session(&five_component_rig("c", "build"));
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        assert!(report.is_aborted());
        assert_eq!(report.state, SessionState::Aborted);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, BuildStage::Build);
        assert_eq!(failure.subject, Subject::component("c"));
        assert!(report.status_line().contains("component 'c'"));

        assert_eq!(outcome_of(&report, BuildStage::Build, "a"), Some(EntryOutcome::Completed));
        assert_eq!(outcome_of(&report, BuildStage::Build, "b"), Some(EntryOutcome::Completed));
        assert_eq!(outcome_of(&report, BuildStage::Build, "c"), Some(EntryOutcome::Failed));
        assert_eq!(outcome_of(&report, BuildStage::Build, "d"), None);
        assert_eq!(outcome_of(&report, BuildStage::Build, "e"), None);
        assert_eq!(outcome_of(&report, BuildStage::Connect, "a"), None);

        let later: Vec<BuildStage> = report
            .entries
            .iter()
            .filter(|e| e.subject == Subject::Session && e.outcome == EntryOutcome::Skipped)
            .map(|e| e.stage)
            .collect();
        assert_eq!(later, vec![BuildStage::Connect, BuildStage::Finalize]);

        // No rollback.
        assert!(h.scene.exists("a_out"));
        assert!(h.scene.exists("b_out"));
        assert!(!h.scene.exists("d_out"));
        assert_eq!(session.instances()[1].state(), ComponentState::Built);
        assert_eq!(session.instances()[3].state(), ComponentState::Guided);
    }

    #[test]
    fn test_aborted_session_cannot_continue() {
        let mut h = Harness::new();
        let mut session = h.session(&five_component_rig("a", "initialize"));
        let report = h.run(&mut session, &[BuildStage::Initialize]).unwrap();
        assert!(report.is_aborted());

        let err = h.run(&mut session, &[BuildStage::Guide]).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition { from: SessionState::Aborted, .. }
        ));
    }

    #[test]
    fn test_guide_twice_creates_no_duplicate_guides() {
        let mut h = Harness::new();
        let rig = RigDescription::new("test")
            .with_component(probe("a"))
            .with_component(probe("b"));
        let mut session = h.session(&rig);

        h.run(&mut session, &[BuildStage::Initialize, BuildStage::Guide]).unwrap();
        let guides = h.scene.nodes_with_tag(GUIDE_TAG);
        assert_eq!(guides.len(), 2);

        let report = h.run(&mut session, &[BuildStage::Guide]).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Succeeded);
        assert_eq!(h.scene.nodes_with_tag(GUIDE_TAG), guides);
        let skipped = report
            .entries
            .iter()
            .filter(|e| e.stage == BuildStage::Guide && e.outcome == EntryOutcome::Skipped)
            .count();
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_invalid_transition_is_rejected_before_mutation() {
        let mut h = Harness::new();
        let mut session = h.session(&five_component_rig("", ""));
        let err = h
            .run(&mut session, &[BuildStage::Initialize, BuildStage::Build])
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                from: SessionState::Initialized,
                stage: BuildStage::Build
            }
        ));
        assert!(h.scene.is_empty());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_unknown_type_aborts_before_mutation() {
        let mut h = Harness::new();
        let rig = RigDescription::new("test")
            .with_component(probe("a"))
            .with_component(ComponentRecord::new("b", "tentacle.tentacle"));
        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        assert!(report.is_aborted());
        assert_eq!(report.failure.unwrap().stage, BuildStage::Initialize);
        assert!(h.scene.is_empty());
    }

    #[test]
    fn test_second_session_resumes_from_stamped_state() {
        let mut h = Harness::new();
        let rig = RigDescription::new("test").with_component(probe("a"));
        let mut first = h.session(&rig);
        h.run(&mut first, &BuildStage::STANDARD).unwrap();

        let mut second = h.session(&rig);
        let report = h.run(&mut second, &BuildStage::STANDARD).unwrap();
        assert_eq!(report.outcome, SessionOutcome::Succeeded);
        assert!(report
            .entries_for("a")
            .all(|e| e.outcome == EntryOutcome::Skipped));
    }

    #[test]
    fn test_missing_rig_parent_is_unresolved() {
        let mut h = Harness::new();
        let rig = RigDescription::new("test").with_component(probe("a").with_rig_parent("nowhere"));
        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, BuildStage::Connect);
        assert!(failure.error.contains("unresolved reference 'nowhere'"));
    }

    #[test]
    fn test_output_shadowed_by_foreign_node_is_ambiguous() {
        let mut h = Harness::new();
        h.scene.create_node("a_out", None).unwrap();
        let rig = RigDescription::new("test")
            .with_component(probe("a").with_param("skipOutput", json!(true)))
            .with_component(probe("b").with_rig_parent("a_out"));
        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        let failure = report.failure.unwrap();
        assert_eq!(failure.subject, Subject::component("b"));
        assert!(failure.error.contains("names both an output of 'a'"));
    }

    #[test]
    fn test_hooks_run_at_their_stages_and_per_tagged_component() {
        let mut h = Harness::new();
        let mut rig = RigDescription::new("test")
            .with_component(probe("jaw").with_tag("face"))
            .with_component(probe("brow").with_tag("face"))
            .with_component(probe("arm"));
        rig.pre_script = vec![HookRef::new("pre.sh")];
        rig.post_script = vec![HookRef::new("face.sh").with_tags(["face"])];
        rig.pub_script = vec![HookRef::new("pub.sh")];

        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        assert_eq!(report.outcome, SessionOutcome::Succeeded);
        assert_eq!(
            h.hooks.calls,
            vec!["pre:pre.sh", "post:face.sh:jaw", "post:face.sh:brow", "pub:pub.sh"]
        );
    }

    #[test]
    fn test_failing_hook_aborts_with_hook_subject() {
        let mut h = Harness::new();
        h.hooks.fail = Some(PathBuf::from("post.sh"));
        let mut rig = RigDescription::new("test").with_component(probe("a"));
        rig.post_script = vec![HookRef::new("post.sh")];

        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, BuildStage::Connect);
        assert!(matches!(failure.subject, Subject::Hook { .. }));
    }

    #[test]
    fn test_missing_artifact_is_a_warning() {
        let mut h = Harness::new();
        h.store.files.insert(
            PathBuf::from("/rigs/test/shapes.json"),
            (ArtifactKind::Curve, json!({"a_out": "circle"})),
        );
        let mut rig = RigDescription::new("test").with_component(probe("a"));
        rig.artifacts = vec![
            ArtifactBinding {
                kind: ArtifactKind::Curve,
                path: "shapes.json".into(),
                stage: None,
            },
            ArtifactBinding {
                kind: ArtifactKind::Skin,
                path: "skins".into(),
                stage: None,
            },
        ];

        let mut session = h.session(&rig);
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        assert_eq!(report.outcome, SessionOutcome::Succeeded);
        assert_eq!(h.scene.attr("a_out", "loaded"), Some(json!("circle")));
        assert_eq!(report.skipped_artifacts.len(), 1);
        assert_eq!(report.skipped_artifacts[0].path, PathBuf::from("/rigs/test/skins"));
        assert!(report.entries.iter().any(|e| e.outcome == EntryOutcome::Warning));
    }

    #[test]
    fn test_cancelled_build_aborts_between_components() {
        let mut h = Harness::new();
        h.cancel.cancel();
        let mut session = h.session(&five_component_rig("", ""));
        let report = h.run(&mut session, &BuildStage::STANDARD).unwrap();

        assert!(report.is_aborted());
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, BuildStage::Initialize);
        assert!(report.entries.iter().any(|e| e.outcome == EntryOutcome::Cancelled));
        assert!(!h.scene.exists("a_container"));
    }

    #[test]
    fn test_events_follow_the_pipeline() {
        let mut h = Harness::new();
        let bus = EventBus::new(256);
        let mut rx = bus.subscribe();
        let rig = RigDescription::new("test").with_component(probe("a"));
        let mut session = h.session(&rig);

        let cx = BuildContext {
            scene: &mut h.scene,
            artifacts: &mut h.store,
            hooks: &mut h.hooks,
            paths: RigPaths::for_env_root("/rigs/test"),
            cancel: h.cancel.clone(),
            events: Some(bus.clone()),
        };
        BuildOrchestrator::new(&h.registry, cx)
            .run(&mut session, &[BuildStage::Initialize])
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                BuildEvent::StageStarted { .. } => "stage_started",
                BuildEvent::ComponentStarted { .. } => "component_started",
                BuildEvent::ComponentFinished { .. } => "component_finished",
                BuildEvent::HookStarted { .. } => "hook_started",
                BuildEvent::StageFinished { .. } => "stage_finished",
                BuildEvent::SessionFinished { .. } => "session_finished",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "stage_started",
                "component_started",
                "component_finished",
                "stage_finished",
                "session_finished",
            ]
        );
    }
}
