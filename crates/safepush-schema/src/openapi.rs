use std::collections::BTreeMap;

use safepush_core::{InputProperty, InputType, OutputSpec, Schema};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema has no {0} definition")]
    Missing(&'static str),
    #[error("{0} is not an object")]
    NotAnObject(String),
    #[error("unresolved reference {0}")]
    UnresolvedRef(String),
}

/// Parses a version's OpenAPI document into a [`Schema`].
///
/// Accepts either the full document or just its `components.schemas` map.
pub fn parse_openapi(doc: &Value) -> Result<Schema, SchemaError> {
    let schemas = match doc.pointer("/components/schemas") {
        Some(s) => s,
        None => doc,
    };
    let schemas = schemas
        .as_object()
        .ok_or_else(|| SchemaError::NotAnObject("components.schemas".into()))?;

    let input = schemas.get("Input").ok_or(SchemaError::Missing("Input"))?;
    let output = schemas.get("Output").ok_or(SchemaError::Missing("Output"))?;

    let required: Vec<&str> = input
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut inputs = Vec::new();
    if let Some(props) = input.get("properties").and_then(Value::as_object) {
        for (name, spec) in props {
            inputs.push(parse_property(name, spec, required.contains(&name.as_str()), schemas)?);
        }
    }
    inputs.sort_by(|a, b| {
        let ka = a.order.unwrap_or(i64::MAX);
        let kb = b.order.unwrap_or(i64::MAX);
        ka.cmp(&kb).then_with(|| a.name.cmp(&b.name))
    });

    Ok(Schema {
        inputs,
        output: parse_output(output, schemas, &mut Vec::new())?,
    })
}

fn parse_property(
    name: &str,
    spec: &Value,
    required: bool,
    schemas: &Map<String, Value>,
) -> Result<InputProperty, SchemaError> {
    let ty = parse_input_type(spec, schemas, &mut Vec::new())?;
    Ok(InputProperty {
        name: name.to_string(),
        ty,
        format: spec.get("format").and_then(Value::as_str).map(String::from),
        nullable: spec.get("nullable").and_then(Value::as_bool).unwrap_or(false),
        description: spec.get("description").and_then(Value::as_str).map(String::from),
        default: spec.get("default").cloned(),
        minimum: spec.get("minimum").and_then(Value::as_f64),
        maximum: spec.get("maximum").and_then(Value::as_f64),
        required,
        order: spec.get("x-order").and_then(Value::as_i64),
    })
}

/// `path` holds the refs followed to reach `spec`; a ref already on it is a
/// cycle and parses as `Any`.
fn parse_input_type(spec: &Value, schemas: &Map<String, Value>, path: &mut Vec<String>) -> Result<InputType, SchemaError> {
    // Choices are emitted as `allOf: [{$ref: ...}]` pointing at an enum schema.
    if let Some(target) = first_ref(spec) {
        if path.iter().any(|seen| seen == target) {
            return Ok(InputType::Any);
        }
        let resolved = resolve_ref(target, schemas)?;
        path.push(target.to_string());
        let ty = parse_input_type(resolved, schemas, path);
        path.pop();
        return ty;
    }

    let base = match spec.get("type").and_then(Value::as_str) {
        Some("string") => InputType::String,
        Some("integer") => InputType::Integer,
        Some("number") => InputType::Number,
        Some("boolean") => InputType::Boolean,
        Some("array") => {
            let items = match spec.get("items") {
                Some(items) => parse_input_type(items, schemas, path)?,
                None => InputType::Any,
            };
            InputType::Array { items: Box::new(items) }
        }
        _ => InputType::Any,
    };

    match spec.get("enum").and_then(Value::as_array) {
        Some(choices) => Ok(InputType::Enum {
            base: Box::new(base),
            choices: choices.clone(),
        }),
        None => Ok(base),
    }
}

fn parse_output(spec: &Value, schemas: &Map<String, Value>, path: &mut Vec<String>) -> Result<OutputSpec, SchemaError> {
    if let Some(target) = first_ref(spec) {
        if path.iter().any(|seen| seen == target) {
            return Ok(OutputSpec::Any);
        }
        let resolved = resolve_ref(target, schemas)?;
        path.push(target.to_string());
        let out = parse_output(resolved, schemas, path);
        path.pop();
        return out;
    }

    match spec.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut fields = BTreeMap::new();
            if let Some(props) = spec.get("properties").and_then(Value::as_object) {
                for (name, field) in props {
                    fields.insert(name.clone(), parse_output(field, schemas, path)?);
                }
            }
            let required = spec
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default();
            Ok(OutputSpec::Object { fields, required })
        }
        Some("array") => {
            let items = match spec.get("items") {
                Some(items) => parse_output(items, schemas, path)?,
                None => OutputSpec::Any,
            };
            Ok(OutputSpec::Array { items: Box::new(items) })
        }
        Some(ty) => Ok(OutputSpec::Scalar {
            ty: ty.to_string(),
            format: spec.get("format").and_then(Value::as_str).map(String::from),
        }),
        None => Ok(OutputSpec::Any),
    }
}

fn first_ref(spec: &Value) -> Option<&str> {
    if let Some(r) = spec.get("$ref").and_then(Value::as_str) {
        return Some(r);
    }
    ["allOf", "anyOf", "oneOf"].iter().find_map(|key| {
        spec.get(*key)
            .and_then(Value::as_array)
            .filter(|arr| arr.len() == 1)
            .and_then(|arr| arr[0].get("$ref"))
            .and_then(Value::as_str)
    })
}

fn resolve_ref<'a>(target: &str, schemas: &'a Map<String, Value>) -> Result<&'a Value, SchemaError> {
    let name = target.rsplit('/').next().unwrap_or(target);
    schemas
        .get(name)
        .ok_or_else(|| SchemaError::UnresolvedRef(target.to_string()))
}
