//! Process-backed hook runner.
//!
//! Each hook runs as a child process in the rig environment root with the rig
//! environment variables exported. `.py` scripts run under `python3`, `.sh`
//! scripts under `bash`; anything else is executed directly. A hook that
//! outlives the timeout is killed.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::runtime::Handle;

use rigsmith_core::hook::{HookInvocation, HookRunner};
use rigsmith_types::archetype::HookRef;
use rigsmith_types::error::HookError;

pub const HOOK_KIND_VAR: &str = "RIGSMITH_HOOK_KIND";
pub const STAGE_VAR: &str = "RIGSMITH_STAGE";
pub const COMPONENT_VAR: &str = "RIGSMITH_COMPONENT";
pub const SESSION_ID_VAR: &str = "RIGSMITH_SESSION_ID";
pub const RIG_NAME_VAR: &str = "RIGSMITH_RIG_NAME";

/// Runs hooks on a tokio runtime from the synchronous build thread.
///
/// `run` blocks on `runtime`, so it must be called from outside an async
/// context (a `spawn_blocking` thread or a plain thread).
#[derive(Debug, Clone)]
pub struct ProcessHookRunner {
    runtime: Handle,
    timeout: Duration,
}

impl ProcessHookRunner {
    pub fn new(runtime: Handle, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }

    fn command(script: &Path) -> Command {
        match script.extension().and_then(|ext| ext.to_str()) {
            Some("py") => {
                let mut cmd = Command::new("python3");
                cmd.arg(script);
                cmd
            }
            Some("sh") => {
                let mut cmd = Command::new("bash");
                cmd.arg(script);
                cmd
            }
            _ => Command::new(script),
        }
    }
}

impl HookRunner for ProcessHookRunner {
    fn run(&mut self, hook: &HookRef, invocation: &HookInvocation<'_>) -> Result<(), HookError> {
        let script = invocation.paths.resolve(&hook.path);
        if !script.is_file() {
            return Err(HookError::NotFound(script));
        }

        // Output is captured so hooks never write into the command's stdout.
        let mut cmd = Self::command(&script);
        cmd.current_dir(&invocation.paths.env_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .envs(invocation.paths.env_vars())
            .env(HOOK_KIND_VAR, invocation.kind.to_string())
            .env(STAGE_VAR, invocation.stage.as_str())
            .env(SESSION_ID_VAR, invocation.session_id.to_string())
            .env(RIG_NAME_VAR, invocation.rig_name);
        if let Some(component) = invocation.component {
            cmd.env(COMPONENT_VAR, component);
        }

        let started = Instant::now();
        // Spawned inside the runtime; dropping the child on timeout kills it.
        let output = self.runtime.block_on(async {
            let child = cmd.spawn().map_err(|e| HookError::Spawn {
                path: script.clone(),
                message: e.to_string(),
            })?;
            match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(waited) => waited.map_err(|e| HookError::Spawn {
                    path: script.clone(),
                    message: e.to_string(),
                }),
                Err(_) => Err(HookError::Timeout {
                    path: script.clone(),
                    secs: self.timeout.as_secs(),
                }),
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(
            hook = %script.display(),
            kind = %invocation.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = ?output.status.code(),
            stdout = %stdout.trim(),
            stderr = %stderr.trim(),
            "hook exited"
        );
        if !output.status.success() {
            tracing::warn!(hook = %script.display(), stderr = %stderr.trim(), "hook failed");
            return Err(HookError::Failed {
                path: script,
                code: output.status.code(),
            });
        }
        Ok(())
    }
}
