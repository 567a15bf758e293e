//! Span field names shared by build instrumentation.
//!
//! Used as field names in `tracing::info_span!` so exported traces can be
//! filtered by rig, session, and stage.

/// Rig name being built.
pub const RIG_NAME: &str = "rigsmith.rig.name";

/// Build session id.
pub const SESSION_ID: &str = "rigsmith.session.id";

/// Final stage requested for the session.
pub const TARGET_STAGE: &str = "rigsmith.build.target_stage";

/// Number of components in the rig description.
pub const COMPONENT_COUNT: &str = "rigsmith.build.component_count";

/// Session outcome: `completed`, `completed_with_warnings`, or `aborted`.
pub const OUTCOME: &str = "rigsmith.build.outcome";
