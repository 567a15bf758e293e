//! Hook script port.
//!
//! Hooks are user scripts run at fixed points in the build (after `Guide`,
//! at the end of `Connect`, at the end of `Finalize`). The orchestrator hands
//! each one to a [`HookRunner`]; spawning processes is an infrastructure
//! concern.

use rigsmith_types::archetype::{HookKind, HookRef};
use rigsmith_types::build::BuildStage;
use rigsmith_types::error::HookError;
use rigsmith_types::paths::RigPaths;
use uuid::Uuid;

/// Everything a runner needs to know about one hook call.
#[derive(Debug, Clone, Copy)]
pub struct HookInvocation<'a> {
    pub kind: HookKind,
    pub stage: BuildStage,
    /// Set when a component-tagged hook runs for a specific component.
    pub component: Option<&'a str>,
    pub paths: &'a RigPaths,
    pub session_id: Uuid,
    pub rig_name: &'a str,
}

pub trait HookRunner {
    /// Run one hook to completion. A non-zero exit is an error.
    fn run(&mut self, hook: &HookRef, invocation: &HookInvocation<'_>) -> Result<(), HookError>;
}

/// Runner used when hooks are switched off: logs and does nothing.
#[derive(Debug, Default)]
pub struct DisabledHooks;

impl HookRunner for DisabledHooks {
    fn run(&mut self, hook: &HookRef, invocation: &HookInvocation<'_>) -> Result<(), HookError> {
        tracing::debug!(
            hook = %hook,
            kind = %invocation.kind,
            component = invocation.component,
            "hooks disabled, not running"
        );
        Ok(())
    }
}
