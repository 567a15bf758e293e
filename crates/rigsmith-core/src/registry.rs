//! Component type registry.
//!
//! Maps a type id string (`"chain.chain"`) to a [`ComponentType`]: its
//! version, default parameters, declared outputs, and a factory producing the
//! boxed [`Component`] behavior. The resolver only needs outputs and root
//! status, which it reads through [`OutputProvider`].

use std::collections::BTreeMap;

use rigsmith_types::error::ComponentError;
use rigsmith_types::rig::ComponentRecord;
use semver::Version;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::component::{Component, ComponentInstance};
use crate::components;

/// Default root component type.
pub const DEFAULT_ROOT_TYPE: &str = "main.main";

pub type OutputsFn = fn(&ComponentRecord) -> Vec<String>;
pub type FactoryFn = fn(&ComponentRecord) -> Result<Box<dyn Component>, ComponentError>;

/// A registered component type.
#[derive(Clone)]
pub struct ComponentType {
    pub id: &'static str,
    pub version: Version,
    pub description: &'static str,
    /// Default parameters merged into a record on instantiation.
    pub defaults: Map<String, Value>,
    /// Scene names this type publishes for a given record.
    pub outputs: OutputsFn,
    pub factory: FactoryFn,
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("id", &self.id)
            .field("version", &self.version)
            .finish()
    }
}

/// Summary of a registered type for listing.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentTypeInfo {
    pub id: String,
    pub version: String,
    pub description: String,
    pub is_root: bool,
    pub defaults: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// OutputProvider
// ---------------------------------------------------------------------------

/// What the dependency resolver needs to know about component types.
pub trait OutputProvider {
    /// Scene names `record` will create and that other components may reference.
    fn outputs(&self, record: &ComponentRecord) -> Vec<String>;

    /// Whether `record` is of the root type (ordered first when free of dependencies).
    fn is_root(&self, record: &ComponentRecord) -> bool;
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    types: BTreeMap<String, ComponentType>,
    root_type: String,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ComponentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            types: BTreeMap::new(),
            root_type: DEFAULT_ROOT_TYPE.to_string(),
        }
    }

    /// A registry holding the builtin types (`main.main`, `basic.basic`,
    /// `chain.chain`, `cog.cog`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for component_type in components::builtin_types() {
            registry.register(component_type);
        }
        registry
    }

    /// Register a type, replacing any previous type with the same id.
    pub fn register(&mut self, component_type: ComponentType) {
        if self.types.contains_key(component_type.id) {
            tracing::warn!(component_type = component_type.id, "replacing registered component type");
        }
        self.types.insert(component_type.id.to_string(), component_type);
    }

    pub fn get(&self, id: &str) -> Option<&ComponentType> {
        self.types.get(id)
    }

    pub fn types(&self) -> impl Iterator<Item = &ComponentType> {
        self.types.values()
    }

    pub fn set_root_type(&mut self, id: impl Into<String>) {
        self.root_type = id.into();
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Build a runtime instance for `record`.
    ///
    /// Type defaults fill in parameters the record does not set. A record
    /// pinned to a different major version of its type is built anyway with a
    /// warning.
    pub fn instantiate(&self, record: &ComponentRecord) -> Result<ComponentInstance, ComponentError> {
        let component_type = self
            .get(&record.component_type)
            .ok_or_else(|| ComponentError::UnknownType(record.component_type.clone()))?;

        let mut record = record.clone();
        for (key, value) in &component_type.defaults {
            record
                .parameters
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        if let Some(pinned) = record.version.as_deref() {
            match Version::parse(pinned) {
                Ok(pinned) if pinned.major != component_type.version.major => {
                    tracing::warn!(
                        component = %record.name,
                        pinned = %pinned,
                        available = %component_type.version,
                        "component was saved with a different major version of its type"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(ComponentError::InvalidParameter {
                        component: record.name.clone(),
                        parameter: "version".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let behavior = (component_type.factory)(&record)?;
        Ok(ComponentInstance::new(
            record,
            component_type.version.clone(),
            behavior,
        ))
    }

    /// Listing of every registered type, sorted by id.
    pub fn describe(&self) -> Vec<ComponentTypeInfo> {
        self.types
            .values()
            .map(|t| ComponentTypeInfo {
                id: t.id.to_string(),
                version: t.version.to_string(),
                description: t.description.to_string(),
                is_root: t.id == self.root_type,
                defaults: t.defaults.clone(),
            })
            .collect()
    }
}

impl OutputProvider for ComponentRegistry {
    fn outputs(&self, record: &ComponentRecord) -> Vec<String> {
        self.get(&record.component_type)
            .map(|t| (t.outputs)(record))
            .unwrap_or_default()
    }

    fn is_root(&self, record: &ComponentRecord) -> bool {
        record.component_type == self.root_type
    }
}
