//! `cog.cog`: a single center-of-gravity control.

use rigsmith_types::error::ComponentError;
use rigsmith_types::rig::ComponentRecord;
use semver::Version;
use serde_json::json;

use crate::component::{Component, StageContext, TRANSLATE_ATTR};
use crate::registry::ComponentType;

pub fn component_type() -> ComponentType {
    ComponentType {
        id: "cog.cog",
        version: Version::new(1, 0, 0),
        description: "Center-of-gravity control placed at the first input",
        defaults: super::common_defaults(),
        outputs,
        factory: |_| Ok(Box::new(CogComponent)),
    }
}

fn outputs(record: &ComponentRecord) -> Vec<String> {
    vec![control_name(record)]
}

fn control_name(record: &ComponentRecord) -> String {
    format!("{}_ctl", record.name)
}

struct CogComponent;

impl Component for CogComponent {
    fn build(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let root = cx.root().map(str::to_string);
        let size = cx.param_f64("size", 1.0)?;
        let name = control_name(cx.record);
        let ctl = cx.create_control("cog", &name, root.as_deref())?;
        cx.set_attr(&ctl, "size", json!(size))?;
        if let Some(input) = cx.record.input.first().cloned() {
            let at = cx.translate_of(&input);
            cx.set_attr(&ctl, TRANSLATE_ATTR, at)?;
        }
        Ok(())
    }
}
