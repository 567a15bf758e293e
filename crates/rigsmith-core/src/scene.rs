//! Host scene port.
//!
//! The orchestrator never touches a host application directly; everything it
//! and the components do goes through the [`Scene`] trait. [`MemoryScene`] is
//! the in-process implementation used by the CLI (persisted as JSON between
//! runs) and by tests.

use std::collections::{BTreeMap, BTreeSet};

use rigsmith_types::error::SceneError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Scene trait
// ---------------------------------------------------------------------------

/// Mutation target for a build: named nodes in a single parent hierarchy,
/// each carrying tags, attributes, and optional container membership.
pub trait Scene {
    fn exists(&self, node: &str) -> bool;

    /// Create a node. Fails if the name is taken or the parent is missing.
    fn create_node(&mut self, name: &str, parent: Option<&str>) -> Result<(), SceneError>;

    /// Delete a node. Its children are moved to the top level.
    fn delete_node(&mut self, name: &str) -> Result<(), SceneError>;

    fn parent(&self, node: &str) -> Option<String>;

    fn set_parent(&mut self, node: &str, parent: Option<&str>) -> Result<(), SceneError>;

    fn children(&self, node: &str) -> Vec<String>;

    /// All node names, in a stable order.
    fn nodes(&self) -> Vec<String>;

    fn add_tag(&mut self, node: &str, tag: &str) -> Result<(), SceneError>;

    fn has_tag(&self, node: &str, tag: &str) -> bool;

    fn set_attr(&mut self, node: &str, attr: &str, value: Value) -> Result<(), SceneError>;

    fn attr(&self, node: &str, attr: &str) -> Option<Value>;

    /// Container node that owns `node`, if any.
    fn container_of(&self, node: &str) -> Option<String>;

    fn assign_container(&mut self, node: &str, container: Option<&str>) -> Result<(), SceneError>;

    /// Host-level interaction preference (selection behavior and similar).
    fn set_preference(&mut self, key: &str, value: Value);

    fn preference(&self, key: &str) -> Option<Value>;

    /// Serializable snapshot of the whole scene, used for publishing.
    fn export(&self) -> Value;

    /// Nodes owned by `container`, in [`Scene::nodes`] order.
    fn nodes_in_container(&self, container: &str) -> Vec<String> {
        self.nodes()
            .into_iter()
            .filter(|n| self.container_of(n).as_deref() == Some(container))
            .collect()
    }

    /// Nodes carrying `tag`, in [`Scene::nodes`] order.
    fn nodes_with_tag(&self, tag: &str) -> Vec<String> {
        self.nodes()
            .into_iter()
            .filter(|n| self.has_tag(n, tag))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryScene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

/// In-memory [`Scene`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default)]
    nodes: BTreeMap<String, SceneNode>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    preferences: BTreeMap<String, Value>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.get(name)
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut SceneNode, SceneError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| SceneError::NodeNotFound(name.to_string()))
    }

    /// Whether `ancestor` is `node` or one of its parents.
    fn is_ancestor(&self, ancestor: &str, node: &str) -> bool {
        let mut current = Some(node.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.nodes.get(&name).and_then(|n| n.parent.clone());
        }
        false
    }
}

impl Scene for MemoryScene {
    fn exists(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    fn create_node(&mut self, name: &str, parent: Option<&str>) -> Result<(), SceneError> {
        if self.nodes.contains_key(name) {
            return Err(SceneError::NodeExists(name.to_string()));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(SceneError::NodeNotFound(parent.to_string()));
            }
        }
        self.nodes.insert(
            name.to_string(),
            SceneNode {
                parent: parent.map(str::to_string),
                ..SceneNode::default()
            },
        );
        Ok(())
    }

    fn delete_node(&mut self, name: &str) -> Result<(), SceneError> {
        if self.nodes.remove(name).is_none() {
            return Err(SceneError::NodeNotFound(name.to_string()));
        }
        for node in self.nodes.values_mut() {
            if node.parent.as_deref() == Some(name) {
                node.parent = None;
            }
        }
        Ok(())
    }

    fn parent(&self, node: &str) -> Option<String> {
        self.nodes.get(node).and_then(|n| n.parent.clone())
    }

    fn set_parent(&mut self, node: &str, parent: Option<&str>) -> Result<(), SceneError> {
        if !self.nodes.contains_key(node) {
            return Err(SceneError::NodeNotFound(node.to_string()));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(SceneError::NodeNotFound(parent.to_string()));
            }
            if self.is_ancestor(node, parent) {
                return Err(SceneError::InvalidParent {
                    node: node.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        self.node_mut(node)?.parent = parent.map(str::to_string);
        Ok(())
    }

    fn children(&self, node: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.parent.as_deref() == Some(node))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn nodes(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    fn add_tag(&mut self, node: &str, tag: &str) -> Result<(), SceneError> {
        self.node_mut(node)?.tags.insert(tag.to_string());
        Ok(())
    }

    fn has_tag(&self, node: &str, tag: &str) -> bool {
        self.nodes.get(node).is_some_and(|n| n.tags.contains(tag))
    }

    fn set_attr(&mut self, node: &str, attr: &str, value: Value) -> Result<(), SceneError> {
        self.node_mut(node)?.attrs.insert(attr.to_string(), value);
        Ok(())
    }

    fn attr(&self, node: &str, attr: &str) -> Option<Value> {
        self.nodes.get(node).and_then(|n| n.attrs.get(attr).cloned())
    }

    fn container_of(&self, node: &str) -> Option<String> {
        self.nodes.get(node).and_then(|n| n.container.clone())
    }

    fn assign_container(&mut self, node: &str, container: Option<&str>) -> Result<(), SceneError> {
        if let Some(container) = container {
            if !self.nodes.contains_key(container) {
                return Err(SceneError::NodeNotFound(container.to_string()));
            }
        }
        self.node_mut(node)?.container = container.map(str::to_string);
        Ok(())
    }

    fn set_preference(&mut self, key: &str, value: Value) {
        self.preferences.insert(key.to_string(), value);
    }

    fn preference(&self, key: &str) -> Option<Value> {
        self.preferences.get(key).cloned()
    }

    fn export(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
