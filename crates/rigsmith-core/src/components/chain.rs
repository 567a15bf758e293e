//! `chain.chain`: an FK chain over its inputs.
//!
//! Guide places one guide per input at the input's position. Build creates a
//! parented FK control per guide. Connect marks each input as driven by its
//! control.

use rigsmith_types::error::ComponentError;
use rigsmith_types::rig::ComponentRecord;
use semver::Version;
use serde_json::json;

use crate::component::{Component, StageContext, TRANSLATE_ATTR};
use crate::registry::ComponentType;

pub fn component_type() -> ComponentType {
    ComponentType {
        id: "chain.chain",
        version: Version::new(1, 0, 0),
        description: "FK chain with one guide and one control per input",
        defaults: super::common_defaults(),
        outputs,
        factory: |record| {
            if record.input.is_empty() {
                return Err(ComponentError::InvalidParameter {
                    component: record.name.clone(),
                    parameter: "input".to_string(),
                    reason: "a chain needs at least one input".to_string(),
                });
            }
            Ok(Box::new(ChainComponent))
        },
    }
}

fn outputs(record: &ComponentRecord) -> Vec<String> {
    (0..record.input.len())
        .map(|i| fk_name(&record.name, i))
        .collect()
}

fn fk_name(component: &str, index: usize) -> String {
    format!("{component}_fk_{index}_ctl")
}

struct ChainComponent;

impl Component for ChainComponent {
    fn guide(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let inputs = cx.record.input.clone();
        for (index, input) in inputs.iter().enumerate() {
            let guide = cx.create_guide(&format!("guide_{index}"), &format!("guide_{index}"), None)?;
            let at = cx.translate_of(input);
            cx.set_attr(&guide, TRANSLATE_ATTR, at)?;
        }
        Ok(())
    }

    fn build(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let size = cx.param_f64("size", 1.0)?;
        let mut parent = cx.root().map(str::to_string);
        let component = cx.name().to_string();

        for index in 0..cx.record.input.len() {
            let guide = cx
                .control(&format!("guide_{index}"))
                .map(str::to_string)
                .ok_or_else(|| cx.failure(format!("guide {index} missing; run guide first")))?;
            let ctl = cx.create_control(
                &format!("fk_{index}"),
                &fk_name(&component, index),
                parent.as_deref(),
            )?;
            let at = cx.translate_of(&guide);
            cx.set_attr(&ctl, TRANSLATE_ATTR, at)?;
            cx.set_attr(&ctl, "size", json!(size))?;
            parent = Some(ctl);
        }
        Ok(())
    }

    fn connect(&mut self, cx: &mut StageContext<'_>) -> Result<(), ComponentError> {
        let inputs = cx.record.input.clone();
        for (index, input) in inputs.iter().enumerate() {
            cx.require(input)?;
            let ctl = fk_name(cx.name(), index);
            cx.set_attr(input, "driver", json!(ctl))?;
        }
        Ok(())
    }
}
