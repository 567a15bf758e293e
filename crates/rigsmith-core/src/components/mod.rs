//! Builtin component types.
//!
//! Geometry-free stand-ins for the standard leaf types: they create the node
//! hierarchy, controls and attributes a real rig would, against any [`Scene`].
//!
//! [`Scene`]: crate::scene::Scene

pub mod basic;
pub mod chain;
pub mod cog;
pub mod main;

use serde_json::{Map, Value, json};

use crate::registry::ComponentType;

/// Every builtin type, ready to register.
pub fn builtin_types() -> Vec<ComponentType> {
    vec![
        main::component_type(),
        basic::component_type(),
        chain::component_type(),
        cog::component_type(),
    ]
}

/// Parameters shared by every builtin type.
fn common_defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("size".to_string(), json!(1.0));
    defaults
}
