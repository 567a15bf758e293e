use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::ArtifactKind;

/// Errors from build-order resolution. Raised before any scene mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Members are listed in cycle order, without repeating the first.
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<String> },

    #[error("unknown component '{0}'")]
    UnknownComponent(String),
}

/// Errors from archetype layering. Raised before any scene mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchetypeError {
    #[error("unknown archetype '{name}'{}", referenced_by_suffix(.referenced_by))]
    UnknownArchetype {
        name: String,
        referenced_by: Option<String>,
    },

    #[error("archetype inheritance cycle: {}", format_cycle(.cycle))]
    ArchetypeCycle { cycle: Vec<String> },
}

/// Errors raised by a scene implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("node '{0}' does not exist")]
    NodeNotFound(String),

    #[error("node '{0}' already exists")]
    NodeExists(String),

    #[error("cannot parent '{node}' under '{parent}'")]
    InvalidParent { node: String, parent: String },
}

/// Errors raised while instantiating or running a component.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("unknown component type '{0}'")]
    UnknownType(String),

    #[error("component '{component}': invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        component: String,
        parameter: String,
        reason: String,
    },

    #[error("node '{node}' is already owned by container '{owner}'")]
    NameCollision { node: String, owner: String },

    #[error("component '{component}': unresolved reference '{reference}'")]
    UnresolvedReference { component: String, reference: String },

    #[error(
        "component '{component}': reference '{reference}' names both an output of '{owner}' and an unrelated scene node"
    )]
    AmbiguousReference {
        component: String,
        reference: String,
        owner: String,
    },

    #[error("component '{component}' failed: {reason}")]
    BuildFailure { component: String, reason: String },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Errors from artifact load/save.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact path '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("corrupt artifact '{}': {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported schema version '{found}' in '{}' (supported: {supported})", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: String,
        supported: String,
    },

    #[error("artifact '{}' holds {found} data, expected {expected}", path.display())]
    KindMismatch {
        path: PathBuf,
        expected: ArtifactKind,
        found: ArtifactKind,
    },

    #[error("{kind} data targets missing node '{node}'")]
    MissingTarget { kind: ArtifactKind, node: String },

    #[error("invalid {kind} data: {reason}")]
    InvalidData { kind: ArtifactKind, reason: String },

    #[error("no handler registered for {0} artifacts")]
    NoHandler(ArtifactKind),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Errors from running a hook script.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook script '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to start hook '{}': {message}", path.display())]
    Spawn { path: PathBuf, message: String },

    #[error("hook '{}' exited with {}", path.display(), exit_code_text(.code))]
    Failed { path: PathBuf, code: Option<i32> },

    #[error("hook '{}' timed out after {secs}s", path.display())]
    Timeout { path: PathBuf, secs: u64 },
}

/// Errors from reading or writing rig and archetype files.
#[derive(Debug, Error)]
pub enum RigFileError {
    #[error("failed to read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to write '{}': {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("no rig file found in '{}'", .0.display())]
    NoRigFile(PathBuf),
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}

fn referenced_by_suffix(referenced_by: &Option<String>) -> String {
    referenced_by
        .as_ref()
        .map(|p| format!(" (parent of '{p}')"))
        .unwrap_or_default()
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}
