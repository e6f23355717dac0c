use safepush_core::{Compatibility, InputProperty, InputType, OutputSpec, Schema};
use serde_json::Value;

/// Compares a candidate schema against the current one.
///
/// `ignore` keeps the violations in the result but marks them as overridden.
pub fn compare(current: &Schema, candidate: &Schema, ignore: bool) -> Compatibility {
    let violations = violations(current, candidate);
    if violations.is_empty() {
        Compatibility::Compatible
    } else {
        tracing::debug!(count = violations.len(), ignore, "schema incompatibilities");
        Compatibility::Incompatible {
            violations,
            ignored: ignore,
        }
    }
}

/// Every way `candidate` breaks callers written against `current`, in a stable order:
/// current inputs by schema order, then new inputs, then output.
pub fn violations(current: &Schema, candidate: &Schema) -> Vec<String> {
    let mut out = Vec::new();

    for old in &current.inputs {
        match candidate.input(&old.name) {
            Some(new) => compare_input(old, new, &mut out),
            None => out.push(format!("Missing input {}", old.name)),
        }
    }

    for new in &candidate.inputs {
        if !current.has_input(&new.name) && !new.is_optional() {
            out.push(format!("Input {} is new and is required", new.name));
        }
    }

    compare_output(&current.output, &candidate.output, "Output", &mut out);
    out
}

fn compare_input(old: &InputProperty, new: &InputProperty, out: &mut Vec<String>) {
    let name = &old.name;

    if !type_widens(old.ty.base(), new.ty.base()) {
        out.push(format!(
            "Input {name} has changed type from {} to {}",
            old.ty.base(),
            new.ty.base()
        ));
        // Constraint comparisons are meaningless across types.
        return;
    }

    if old.is_optional() && !new.is_optional() {
        out.push(format!("Input {name} is now required"));
    }
    if old.nullable && !new.nullable {
        out.push(format!("Input {name} is no longer nullable"));
    }

    match (old.minimum, new.minimum) {
        (None, Some(_)) => out.push(format!("Input {name} has added a minimum constraint")),
        (Some(a), Some(b)) if b > a => out.push(format!("Input {name} has a higher minimum")),
        _ => {}
    }
    match (old.maximum, new.maximum) {
        (None, Some(_)) => out.push(format!("Input {name} has added a maximum constraint")),
        (Some(a), Some(b)) if b < a => out.push(format!("Input {name} has a lower maximum")),
        _ => {}
    }

    if old.format != new.format {
        out.push(format!("Input {name} has changed format"));
    }

    match (&old.ty, &new.ty) {
        (InputType::Enum { choices: old_choices, base: old_base }, InputType::Enum { choices: new_choices, base: new_base }) => {
            if old_base != new_base {
                out.push(format!(
                    "Input {name} choices has changed type from {old_base} to {new_base}"
                ));
                return;
            }
            let missing: Vec<String> = old_choices
                .iter()
                .filter(|c| !new_choices.contains(c))
                .map(choice_label)
                .collect();
            if !missing.is_empty() {
                out.push(format!("Input {name} is missing choices: {}", missing.join(", ")));
            }
        }
        (ty, InputType::Enum { .. }) if !matches!(ty, InputType::Enum { .. }) => {
            out.push(format!("Input {name} has been restricted to choices"));
        }
        _ => {}
    }
}

/// True when every value valid for `old` is still valid for `new`.
fn type_widens(old: &InputType, new: &InputType) -> bool {
    match (old, new) {
        (_, InputType::Any) => true,
        (InputType::Integer, InputType::Number) => true,
        (InputType::Array { items: a }, InputType::Array { items: b }) => type_widens(a.base(), b.base()),
        (a, b) => a == b,
    }
}

fn choice_label(v: &Value) -> String {
    match v {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

fn compare_output(old: &OutputSpec, new: &OutputSpec, path: &str, out: &mut Vec<String>) {
    match (old, new) {
        (OutputSpec::Any, _) | (_, OutputSpec::Any) => {}
        (OutputSpec::Object { fields: old_fields, .. }, OutputSpec::Object { fields: new_fields, .. }) => {
            for (field, old_spec) in old_fields {
                match new_fields.get(field) {
                    Some(new_spec) => compare_output(old_spec, new_spec, &format!("{path}.{field}"), out),
                    None => out.push(format!("{path} is missing field {field}")),
                }
            }
        }
        (OutputSpec::Array { items: a }, OutputSpec::Array { items: b }) => {
            compare_output(a, b, &format!("{path}[]"), out);
        }
        (
            OutputSpec::Scalar { ty: old_ty, format: old_format },
            OutputSpec::Scalar { ty: new_ty, format: new_format },
        ) => {
            if old_ty != new_ty {
                out.push(format!("{path} has changed type from {old_ty} to {new_ty}"));
            } else if old_format != new_format {
                out.push(format!("{path} has changed format"));
            }
        }
        (a, b) => out.push(format!(
            "{path} has changed type from {} to {}",
            a.type_name(),
            b.type_name()
        )),
    }
}
