//! Build sessions.
//!
//! A [`BuildSession`] is one run of the pipeline over one rig: the resolved
//! build order, the layered hook plan, the runtime component instances, and
//! the append-only log that becomes the [`BuildReport`]. Everything that can
//! fail before the scene is touched (cycles, unknown archetypes, unknown
//! `--only` targets) fails in [`BuildSession::prepare`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rigsmith_types::archetype::HookPlan;
use rigsmith_types::artifact::{ArtifactBinding, SkippedArtifact};
use rigsmith_types::build::{
    BuildFailure, BuildReport, BuildStage, EntryOutcome, ReportEntry, SessionOutcome,
    SessionState, Subject,
};
use rigsmith_types::rig::{ComponentRecord, RigDescription};
use uuid::Uuid;

use crate::archetype::{ArchetypeLibrary, layer_rig_hooks, resolve_archetypes};
use crate::component::ComponentInstance;
use crate::orchestrator::OrchestratorError;
use crate::registry::{ComponentRegistry, OutputProvider};
use crate::resolver::DependencyGraph;

#[derive(Debug)]
pub struct BuildSession {
    id: Uuid,
    rig_name: String,
    container_name: String,
    records: Vec<ComponentRecord>,
    hooks: HookPlan,
    artifacts: Vec<ArtifactBinding>,
    /// Output name -> owning component, first declaration wins.
    outputs: HashMap<String, String>,
    state: SessionState,
    log: Vec<ReportEntry>,
    failure: Option<BuildFailure>,
    pub(crate) instances: Vec<ComponentInstance>,
    pub(crate) skipped_artifacts: Vec<SkippedArtifact>,
    started_at: DateTime<Utc>,
}

impl BuildSession {
    /// Resolve the build order and hook plan for `rig`.
    ///
    /// With `only`, the session covers that component and its transitive
    /// dependencies instead of the whole rig.
    pub fn prepare(
        rig: &RigDescription,
        registry: &ComponentRegistry,
        library: &ArchetypeLibrary,
        only: Option<&str>,
    ) -> Result<Self, OrchestratorError> {
        let graph = DependencyGraph::build(&rig.components, registry);
        let ordered = match only {
            Some(name) => graph.transitive_dependencies(name)?,
            None => graph.order()?,
        };
        let records: Vec<ComponentRecord> = ordered.into_iter().cloned().collect();

        let mut hooks = resolve_archetypes(&rig.archetype_parent, library)?;
        layer_rig_hooks(&mut hooks, rig);

        let mut outputs = HashMap::new();
        for record in rig.components.iter().filter(|r| r.enabled) {
            for output in registry.outputs(record) {
                outputs.entry(output).or_insert_with(|| record.name.clone());
            }
        }

        let id = Uuid::now_v7();
        tracing::info!(
            session_id = %id,
            rig = %rig.rig_name,
            components = records.len(),
            archetypes = ?hooks.lineage,
            "prepared build session"
        );

        Ok(Self {
            id,
            rig_name: rig.rig_name.clone(),
            container_name: rig.container_name(),
            records,
            hooks,
            artifacts: rig.artifacts.clone(),
            outputs,
            state: SessionState::Uninitialized,
            log: Vec::new(),
            failure: None,
            instances: Vec::new(),
            skipped_artifacts: Vec::new(),
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rig_name(&self) -> &str {
        &self.rig_name
    }

    /// Top-level container node holding every component container.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Records in build order.
    pub fn records(&self) -> &[ComponentRecord] {
        &self.records
    }

    pub fn order(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn hooks(&self) -> &HookPlan {
        &self.hooks
    }

    pub fn artifacts(&self) -> &[ArtifactBinding] {
        &self.artifacts
    }

    /// Component owning the output `name`, if any component declares it.
    pub fn output_owner(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn log(&self) -> &[ReportEntry] {
        &self.log
    }

    pub fn failure(&self) -> Option<&BuildFailure> {
        self.failure.as_ref()
    }

    pub fn instances(&self) -> &[ComponentInstance] {
        &self.instances
    }

    /// Append an entry to the session log.
    pub fn record(
        &mut self,
        stage: BuildStage,
        subject: Subject,
        outcome: EntryOutcome,
        message: Option<String>,
    ) {
        self.log.push(ReportEntry {
            stage,
            subject,
            outcome,
            message,
            at: Utc::now(),
        });
    }

    /// Mark the session aborted by `subject` failing in `stage`.
    pub(crate) fn abort(&mut self, stage: BuildStage, subject: Subject, error: String) {
        self.failure = Some(BuildFailure {
            stage,
            subject,
            error,
        });
        self.state = SessionState::Aborted;
    }

    /// Snapshot the session as a report.
    pub fn report(&self) -> BuildReport {
        let outcome = if self.state == SessionState::Aborted {
            SessionOutcome::Aborted
        } else {
            SessionOutcome::Succeeded
        };
        BuildReport {
            session_id: self.id,
            rig_name: self.rig_name.clone(),
            outcome,
            state: self.state,
            order: self.order(),
            entries: self.log.clone(),
            failure: self.failure.clone(),
            skipped_artifacts: self.skipped_artifacts.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
