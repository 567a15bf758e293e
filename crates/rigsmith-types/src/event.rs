//! Event types for the build event bus.
//!
//! `BuildEvent` is broadcast while a session runs so front ends can render
//! progress without reading the session log. All variants are Clone + Send +
//! Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archetype::HookKind;
use crate::build::{BuildStage, EntryOutcome, SessionOutcome};

/// Events emitted during a build session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// A stage is about to iterate its components.
    StageStarted {
        session_id: Uuid,
        stage: BuildStage,
        components: usize,
    },

    /// A component stage method is about to run.
    ComponentStarted {
        session_id: Uuid,
        stage: BuildStage,
        component: String,
        /// Index of this component in build order (0-based).
        index: usize,
        total: usize,
    },

    /// A component stage method returned (or was skipped).
    ComponentFinished {
        session_id: Uuid,
        stage: BuildStage,
        component: String,
        outcome: EntryOutcome,
    },

    /// A hook script is about to run.
    HookStarted {
        session_id: Uuid,
        stage: BuildStage,
        kind: HookKind,
        path: String,
    },

    /// All components of a stage finished.
    StageFinished { session_id: Uuid, stage: BuildStage },

    /// The session ended.
    SessionFinished {
        session_id: Uuid,
        outcome: SessionOutcome,
    },
}

impl BuildEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            BuildEvent::StageStarted { session_id, .. }
            | BuildEvent::ComponentStarted { session_id, .. }
            | BuildEvent::ComponentFinished { session_id, .. }
            | BuildEvent::HookStarted { session_id, .. }
            | BuildEvent::StageFinished { session_id, .. }
            | BuildEvent::SessionFinished { session_id, .. } => *session_id,
        }
    }
}
