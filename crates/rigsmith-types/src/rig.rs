//! Rig description and component record types.
//!
//! A rig description is the persisted JSON document a build starts from: rig
//! level metadata (archetypes, skeleton root, local hooks, artifact bindings,
//! publish settings) plus an ordered mapping of component name to
//! [`ComponentRecord`].
//!
//! Both levels keep fields they do not understand so that a load-then-save
//! never drops data written by a newer tool.

use serde::de::{Error as _, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::archetype::{HookKind, HookRef};
use crate::artifact::ArtifactBinding;
use crate::serde_util::{null_as_empty, string_or_list};

/// Rig file extension (JSON content).
pub const RIG_FILE_EXTENSION: &str = "rig";

// ---------------------------------------------------------------------------
// ComponentRecord
// ---------------------------------------------------------------------------

/// Persisted description of one component.
///
/// Every key other than the named fields is a component parameter and lands
/// in `parameters`, which is what lets unknown keys survive a round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Unique name within the rig. Filled from the map key on load.
    #[serde(default)]
    pub name: String,
    /// Registry key, e.g. `"chain.chain"`.
    #[serde(rename = "type")]
    pub component_type: String,
    /// External references the component consumes (usually joints).
    #[serde(default, deserialize_with = "string_or_list")]
    pub input: Vec<String>,
    /// Output of another component, or a pre-existing scene path. Empty for roots.
    #[serde(rename = "rigParent", default, deserialize_with = "null_as_empty")]
    pub rig_parent: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "componentTag", default, skip_serializing_if = "Option::is_none")]
    pub component_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl ComponentRecord {
    pub fn new(name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: component_type.into(),
            input: Vec::new(),
            rig_parent: String::new(),
            enabled: true,
            component_tag: None,
            version: None,
            parameters: Map::new(),
        }
    }

    pub fn with_input(mut self, input: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.input = input.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rig_parent(mut self, rig_parent: impl Into<String>) -> Self {
        self.rig_parent = rig_parent.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.component_tag = Some(tag.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_rig_parent(&self) -> bool {
        !self.rig_parent.is_empty()
    }

    /// `rigParent` followed by `input`, the order in which references are resolved.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.has_rig_parent()
            .then_some(self.rig_parent.as_str())
            .into_iter()
            .chain(self.input.iter().map(String::as_str))
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }
}

// ---------------------------------------------------------------------------
// RigDescription
// ---------------------------------------------------------------------------

/// The top-level rig file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigDescription {
    pub rig_name: String,
    /// Requested archetypes, left to right.
    #[serde(default, deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub archetype_parent: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton_root: Option<String>,
    /// Rig-local hooks, run after inherited ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_script: Vec<HookRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_script: Vec<HookRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pub_script: Vec<HookRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactBinding>,
    /// Publish destination, relative to the rig environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_type: Option<String>,
    /// Components in declaration order.
    #[serde(default, with = "component_map")]
    pub components: Vec<ComponentRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RigDescription {
    pub fn new(rig_name: impl Into<String>) -> Self {
        Self {
            rig_name: rig_name.into(),
            archetype_parent: Vec::new(),
            skeleton_root: None,
            pre_script: Vec::new(),
            post_script: Vec::new(),
            pub_script: Vec::new(),
            artifacts: Vec::new(),
            output_file: None,
            output_file_suffix: None,
            output_file_type: None,
            components: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_component(mut self, record: ComponentRecord) -> Self {
        self.components.push(record);
        self
    }

    pub fn component(&self, name: &str) -> Option<&ComponentRecord> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn local_hooks(&self, kind: HookKind) -> &[HookRef] {
        match kind {
            HookKind::Pre => &self.pre_script,
            HookKind::Post => &self.post_script,
            HookKind::Pub => &self.pub_script,
        }
    }

    /// Name of the top-level container node for this rig.
    pub fn container_name(&self) -> String {
        format!("{}_rig", self.rig_name)
    }
}

/// Serialize components as an ordered JSON object keyed by name.
mod component_map {
    use super::*;

    pub fn serialize<S>(records: &[ComponentRecord], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(records.len()))?;
        for record in records {
            map.serialize_entry(&record.name, record)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<ComponentRecord>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ComponentMapVisitor;

        impl<'de> Visitor<'de> for ComponentMapVisitor {
            type Value = Vec<ComponentRecord>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an object mapping component name to component record")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut records: Vec<ComponentRecord> = Vec::new();
                while let Some((name, mut record)) = access.next_entry::<String, ComponentRecord>()? {
                    if records.iter().any(|r| r.name == name) {
                        return Err(A::Error::custom(format!("duplicate component '{name}'")));
                    }
                    record.name = name;
                    records.push(record);
                }
                Ok(records)
            }
        }

        deserializer.deserialize_map(ComponentMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "rig_name": "hero",
            "archetype_parent": "biped",
            "skeleton_root": "root_jnt",
            "studio_asset_id": 4412,
            "components": {
                "main": {"type": "main.main", "input": []},
                "spine": {
                    "type": "chain.chain",
                    "input": ["spine_1", "spine_2"],
                    "rigParent": "trs_motion",
                    "size": 2.5,
                    "mirrorMode": "behavior"
                },
                "arm_l": {"type": "basic.basic", "input": "clavicle_l", "rigParent": null, "enabled": false}
            }
        })
    }

    #[test]
    fn test_components_keep_declaration_order_and_names() {
        let rig: RigDescription = serde_json::from_value(sample()).unwrap();
        let names: Vec<&str> = rig.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main", "spine", "arm_l"]);
        assert_eq!(rig.archetype_parent, vec!["biped".to_string()]);

        let arm = rig.component("arm_l").unwrap();
        assert_eq!(arm.input, vec!["clavicle_l".to_string()]);
        assert!(!arm.has_rig_parent());
        assert!(!arm.enabled);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let rig: RigDescription = serde_json::from_value(sample()).unwrap();
        assert_eq!(rig.extra["studio_asset_id"], json!(4412));
        let spine = rig.component("spine").unwrap();
        assert_eq!(spine.param("mirrorMode"), Some(&json!("behavior")));

        let text = serde_json::to_string_pretty(&rig).unwrap();
        let reloaded: RigDescription = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded, rig);
        assert_eq!(reloaded.extra["studio_asset_id"], json!(4412));
    }

    #[test]
    fn test_duplicate_component_names_are_rejected() {
        let text = r#"{"rig_name": "r", "components": {"a": {"type": "basic.basic"}, "a": {"type": "chain.chain"}}}"#;
        let err = serde_json::from_str::<RigDescription>(text).unwrap_err();
        assert!(err.to_string().contains("duplicate component 'a'"));
    }

    #[test]
    fn test_references_list_rig_parent_first() {
        let record = ComponentRecord::new("c", "basic.basic")
            .with_input(["j1", "j2"])
            .with_rig_parent("trs_motion");
        let refs: Vec<&str> = record.references().collect();
        assert_eq!(refs, vec!["trs_motion", "j1", "j2"]);
    }
}
