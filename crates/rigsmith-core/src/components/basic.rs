//! `basic.basic`: one control per input.

use rigsmith_types::error::ComponentError;
use rigsmith_types::rig::ComponentRecord;
use semver::Version;
use serde_json::json;

use crate::component::{Component, StageContext, TRANSLATE_ATTR};
use crate::registry::ComponentType;

pub fn component_type() -> ComponentType {
    ComponentType {
        id: "basic.basic",
        version: Version::new(1, 0, 0),
        description: "One control per input, or a single control without inputs",
        defaults: super::common_defaults(),
        outputs,
        factory: |_| Ok(Box::new(BasicComponent)),
    }
}

fn outputs(record: &ComponentRecord) -> Vec<String> {
    if record.input.is_empty() {
        vec![format!("{}_ctl", record.name)]
    } else {
        record
            .input
            .iter()
            .map(|input| format!("{}_{input}_ctl", record.name))
            .collect()
    }
}

struct BasicComponent;

impl Component for BasicComponent {
    fn build(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let root = cx.root().map(str::to_string);
        let size = cx.param_f64("size", 1.0)?;
        let inputs = cx.record.input.clone();
        let names = outputs(cx.record);

        for (index, name) in names.iter().enumerate() {
            let ctl = cx.create_control(&format!("ctl_{index}"), name, root.as_deref())?;
            cx.set_attr(&ctl, "size", json!(size))?;
            if let Some(input) = inputs.get(index) {
                let at = cx.translate_of(input);
                cx.set_attr(&ctl, TRANSLATE_ATTR, at)?;
            }
        }
        Ok(())
    }

    fn connect(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let inputs = cx.record.input.clone();
        for (index, input) in inputs.iter().enumerate() {
            let Some(ctl) = cx.control(&format!("ctl_{index}")).map(str::to_string) else {
                continue;
            };
            cx.require(input)?;
            cx.set_attr(input, "driver", json!(ctl))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_follow_inputs() {
        let record = ComponentRecord::new("arm_l", "basic.basic").with_input(["shoulder_l", "elbow_l"]);
        assert_eq!(outputs(&record), vec!["arm_l_shoulder_l_ctl", "arm_l_elbow_l_ctl"]);
        assert_eq!(outputs(&ComponentRecord::new("prop", "basic.basic")), vec!["prop_ctl"]);
    }
}
