//! Build stage, state, and report types.
//!
//! A build session moves through a fixed sequence of stages. Each component
//! carries its own [`ComponentState`] (persisted on its container as
//! `build_step`), while the session carries a [`SessionState`]. Every stage
//! and component outcome is appended to the session log and surfaced in the
//! final [`BuildReport`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::{ArtifactKind, SkippedArtifact};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// A build stage, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Initialize,
    Guide,
    Build,
    Connect,
    Finalize,
    Optimize,
}

impl BuildStage {
    /// The standard pipeline (everything except the optional `Optimize`).
    pub const STANDARD: [BuildStage; 5] = [
        BuildStage::Initialize,
        BuildStage::Guide,
        BuildStage::Build,
        BuildStage::Connect,
        BuildStage::Finalize,
    ];

    pub const ALL: [BuildStage; 6] = [
        BuildStage::Initialize,
        BuildStage::Guide,
        BuildStage::Build,
        BuildStage::Connect,
        BuildStage::Finalize,
        BuildStage::Optimize,
    ];

    /// All stages up to and including `self`.
    pub fn through(self) -> Vec<BuildStage> {
        Self::ALL.into_iter().filter(|s| *s <= self).collect()
    }

    /// Component state reached once this stage has run for a component.
    pub fn component_state(self) -> ComponentState {
        match self {
            BuildStage::Initialize => ComponentState::Initialized,
            BuildStage::Guide => ComponentState::Guided,
            BuildStage::Build => ComponentState::Built,
            BuildStage::Connect => ComponentState::Connected,
            BuildStage::Finalize => ComponentState::Finalized,
            BuildStage::Optimize => ComponentState::Optimized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStage::Initialize => "initialize",
            BuildStage::Guide => "guide",
            BuildStage::Build => "build",
            BuildStage::Connect => "connect",
            BuildStage::Finalize => "finalize",
            BuildStage::Optimize => "optimize",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown build stage '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// State of a build session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Guided,
    Built,
    Connected,
    Finalized,
    Optimized,
    Aborted,
}

impl SessionState {
    /// The state reached by running `stage` from `self`, or `None` if the
    /// transition is not allowed.
    ///
    /// Stages run strictly in order, except that `Guide` may be re-run while
    /// the session is still `Guided`.
    pub fn advance(self, stage: BuildStage) -> Option<SessionState> {
        use SessionState::*;
        match (self, stage) {
            (Uninitialized, BuildStage::Initialize) => Some(Initialized),
            (Initialized | Guided, BuildStage::Guide) => Some(Guided),
            (Guided, BuildStage::Build) => Some(Built),
            (Built, BuildStage::Connect) => Some(Connected),
            (Connected, BuildStage::Finalize) => Some(Finalized),
            (Finalized, BuildStage::Optimize) => Some(Optimized),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Optimized | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Guided => "guided",
            SessionState::Built => "built",
            SessionState::Connected => "connected",
            SessionState::Finalized => "finalized",
            SessionState::Optimized => "optimized",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Per-component pipeline step.
///
/// The numeric value is what gets stamped on the component container as
/// `build_step`, so a later session over the same scene can resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Unbuilt = 0,
    Initialized = 1,
    Guided = 2,
    Built = 3,
    Connected = 4,
    Finalized = 5,
    Optimized = 6,
}

impl ComponentState {
    pub fn step(self) -> u8 {
        self as u8
    }

    pub fn from_step(step: u64) -> Option<Self> {
        Some(match step {
            0 => ComponentState::Unbuilt,
            1 => ComponentState::Initialized,
            2 => ComponentState::Guided,
            3 => ComponentState::Built,
            4 => ComponentState::Connected,
            5 => ComponentState::Finalized,
            6 => ComponentState::Optimized,
            _ => return None,
        })
    }

    /// Whether `stage` has already been applied to a component in this state.
    pub fn has_reached(self, stage: BuildStage) -> bool {
        self >= stage.component_state()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a report entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    Component {
        name: String,
    },
    Hook {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<String>,
    },
    Artifact {
        kind: ArtifactKind,
        path: PathBuf,
    },
    Session,
}

impl Subject {
    pub fn component(name: impl Into<String>) -> Self {
        Subject::Component { name: name.into() }
    }

    /// Component name if this subject is a component.
    pub fn component_name(&self) -> Option<&str> {
        match self {
            Subject::Component { name } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Component { name } => write!(f, "component '{name}'"),
            Subject::Hook {
                path,
                component: Some(c),
            } => write!(f, "hook '{}' ({c})", path.display()),
            Subject::Hook { path, .. } => write!(f, "hook '{}'", path.display()),
            Subject::Artifact { kind, path } => write!(f, "{kind} artifact '{}'", path.display()),
            Subject::Session => f.write_str("session"),
        }
    }
}

/// Outcome of a single logged step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Completed,
    /// Already done (resume/idempotent re-run) or not run because of an earlier abort.
    Skipped,
    Warning,
    Failed,
    Cancelled,
}

impl fmt::Display for EntryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryOutcome::Completed => "completed",
            EntryOutcome::Skipped => "skipped",
            EntryOutcome::Warning => "warning",
            EntryOutcome::Failed => "failed",
            EntryOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One `(stage, subject, outcome, message)` record in the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub stage: BuildStage,
    pub subject: Subject,
    pub outcome: EntryOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// Overall session outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Succeeded,
    Aborted,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Succeeded => f.write_str("succeeded"),
            SessionOutcome::Aborted => f.write_str("aborted"),
        }
    }
}

/// The step that aborted a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFailure {
    pub stage: BuildStage,
    pub subject: Subject,
    pub error: String,
}

/// Serializable summary of a finished (or aborted) build session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub session_id: Uuid,
    pub rig_name: String,
    pub outcome: SessionOutcome,
    pub state: SessionState,
    /// Component names in build order.
    pub order: Vec<String>,
    pub entries: Vec<ReportEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<BuildFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_artifacts: Vec<SkippedArtifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn is_aborted(&self) -> bool {
        self.outcome == SessionOutcome::Aborted
    }

    /// One-line human summary, e.g. `rig 'hero' aborted at build: component 'arm_l' ...`.
    pub fn status_line(&self) -> String {
        match &self.failure {
            Some(failure) => format!(
                "rig '{}' aborted at {}: {}: {}",
                self.rig_name, failure.stage, failure.subject, failure.error
            ),
            None => {
                let warnings = self
                    .entries
                    .iter()
                    .filter(|e| e.outcome == EntryOutcome::Warning)
                    .count();
                let mut line = format!(
                    "rig '{}' {} ({} components, state {})",
                    self.rig_name,
                    self.outcome,
                    self.order.len(),
                    self.state
                );
                if warnings > 0 {
                    line.push_str(&format!(", {warnings} warnings"));
                }
                line
            }
        }
    }

    /// Entries for a single component, in log order.
    pub fn entries_for<'a>(&'a self, component: &'a str) -> impl Iterator<Item = &'a ReportEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.subject.component_name() == Some(component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_parse_case_insensitively() {
        assert_eq!("Build".parse::<BuildStage>().unwrap(), BuildStage::Build);
        assert_eq!(" finalize ".parse::<BuildStage>().unwrap(), BuildStage::Finalize);
        assert!("publish".parse::<BuildStage>().is_err());
    }

    #[test]
    fn test_through_includes_all_prior_stages() {
        assert_eq!(
            BuildStage::Build.through(),
            vec![BuildStage::Initialize, BuildStage::Guide, BuildStage::Build]
        );
    }

    #[test]
    fn test_session_transitions_are_linear_except_guide() {
        use SessionState::*;
        assert_eq!(Uninitialized.advance(BuildStage::Initialize), Some(Initialized));
        assert_eq!(Initialized.advance(BuildStage::Guide), Some(Guided));
        assert_eq!(Guided.advance(BuildStage::Guide), Some(Guided));
        assert_eq!(Guided.advance(BuildStage::Build), Some(Built));
        assert_eq!(Initialized.advance(BuildStage::Build), None);
        assert_eq!(Built.advance(BuildStage::Guide), None);
        assert_eq!(Finalized.advance(BuildStage::Optimize), Some(Optimized));
        assert_eq!(Aborted.advance(BuildStage::Initialize), None);
    }

    #[test]
    fn test_component_step_round_trips_through_integer() {
        for state in [
            ComponentState::Unbuilt,
            ComponentState::Guided,
            ComponentState::Optimized,
        ] {
            assert_eq!(ComponentState::from_step(state.step() as u64), Some(state));
        }
        assert_eq!(ComponentState::from_step(9), None);
        assert!(ComponentState::Built.has_reached(BuildStage::Guide));
        assert!(!ComponentState::Guided.has_reached(BuildStage::Build));
    }

    #[test]
    fn test_subject_serializes_with_type_tag() {
        let json = serde_json::to_value(Subject::component("arm_l")).unwrap();
        assert_eq!(json["type"], "component");
        assert_eq!(json["name"], "arm_l");
    }
}
