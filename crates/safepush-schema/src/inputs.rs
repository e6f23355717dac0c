use safepush_core::{Inputs, Schema};

/// Builds the input set sent to a version: the declared values plus schema
/// defaults for every unset input that is not disabled.
///
/// Returns every problem found rather than stopping at the first.
pub fn resolve_inputs(schema: &Schema, declared: &Inputs, disabled: &[String]) -> Result<Inputs, Vec<String>> {
    let mut problems = Vec::new();
    let mut resolved = Inputs::new();

    for (name, value) in declared {
        match schema.input(name) {
            Some(prop) => {
                if let Some(why) = prop.violation(value) {
                    problems.push(why);
                }
                resolved.insert(name.clone(), value.clone());
            }
            None => problems.push(format!("unknown input {name}")),
        }
    }

    for prop in &schema.inputs {
        if resolved.contains_key(&prop.name) || disabled.iter().any(|d| d == &prop.name) {
            continue;
        }
        match &prop.default {
            Some(default) => {
                resolved.insert(prop.name.clone(), default.clone());
            }
            None if prop.required => problems.push(format!("missing required input {}", prop.name)),
            None => {}
        }
    }

    if problems.is_empty() {
        Ok(resolved)
    } else {
        Err(problems)
    }
}

/// Combines oracle-generated values with fixed inputs; fixed values win and
/// disabled or unknown keys are dropped before resolution.
pub fn merge_generated(
    schema: &Schema,
    generated: &Inputs,
    fixed: &Inputs,
    disabled: &[String],
) -> Result<Inputs, Vec<String>> {
    let keep = |name: &String| schema.has_input(name) && !disabled.contains(name);
    let mut merged: Inputs = generated
        .iter()
        .filter(|(k, _)| keep(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (k, v) in fixed {
        if keep(k) {
            merged.insert(k.clone(), v.clone());
        }
    }
    resolve_inputs(schema, &merged, disabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safepush_core::{InputProperty, InputType, OutputSpec};
    use serde_json::json;

    fn schema() -> Schema {
        let p = |name: &str, ty: InputType, required: bool, default: Option<serde_json::Value>| InputProperty {
            name: name.into(),
            ty,
            format: None,
            nullable: false,
            description: None,
            default,
            minimum: None,
            maximum: None,
            required,
            order: None,
        };
        Schema {
            inputs: vec![
                p("prompt", InputType::String, true, None),
                p("steps", InputType::Integer, false, Some(json!(20))),
                p("lora", InputType::String, false, Some(json!("none"))),
                p("seed", InputType::Integer, false, None),
            ],
            output: OutputSpec::Any,
        }
    }

    fn inputs(v: serde_json::Value) -> Inputs {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn fills_defaults_except_disabled() {
        let got = resolve_inputs(&schema(), &inputs(json!({"prompt": "a cat"})), &["lora".into()]).unwrap();
        assert_eq!(got, inputs(json!({"prompt": "a cat", "steps": 20})));
    }

    #[test]
    fn reports_all_problems() {
        let err = resolve_inputs(&schema(), &inputs(json!({"steps": "x", "bogus": 1})), &[]).unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(err.iter().any(|e| e == "unknown input bogus"));
        assert!(err.iter().any(|e| e == "missing required input prompt"));
        assert!(err.iter().any(|e| e.starts_with("steps must be of type integer")));
    }

    #[test]
    fn fixed_overrides_generated_and_disabled_is_dropped() {
        let got = merge_generated(
            &schema(),
            &inputs(json!({"prompt": "gen", "seed": 3, "lora": "x"})),
            &inputs(json!({"seed": 7})),
            &["lora".into()],
        )
        .unwrap();
        assert_eq!(got, inputs(json!({"prompt": "gen", "seed": 7, "steps": 20})));
    }
}
