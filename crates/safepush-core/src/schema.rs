use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of one input property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputType {
    String,
    Integer,
    Number,
    Boolean,
    Array { items: Box<InputType> },
    /// A closed set of allowed values of a base type.
    Enum { base: Box<InputType>, choices: Vec<Value> },
    /// Untyped property; any value is accepted.
    Any,
}

impl InputType {
    /// Type name used in compatibility messages, e.g. `integer`, `array<string>`.
    pub fn name(&self) -> String {
        match self {
            InputType::String => "string".into(),
            InputType::Integer => "integer".into(),
            InputType::Number => "number".into(),
            InputType::Boolean => "boolean".into(),
            InputType::Array { items } => format!("array<{}>", items.name()),
            InputType::Enum { base, .. } => base.name(),
            InputType::Any => "any".into(),
        }
    }

    /// Base type with any enum wrapper removed.
    pub fn base(&self) -> &InputType {
        match self {
            InputType::Enum { base, .. } => base.base(),
            other => other,
        }
    }

    pub fn accepts(&self, v: &Value) -> bool {
        match self {
            InputType::String => v.is_string(),
            InputType::Integer => v.is_i64() || v.is_u64(),
            InputType::Number => v.is_number(),
            InputType::Boolean => v.is_boolean(),
            InputType::Array { items } => v
                .as_array()
                .is_some_and(|arr| arr.iter().all(|item| items.accepts(item))),
            InputType::Enum { base, choices } => base.accepts(v) && choices.contains(v),
            InputType::Any => true,
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One input property of a version's prediction contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputProperty {
    pub name: String,
    pub ty: InputType,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    pub required: bool,
    /// `x-order` position; properties without one sort last.
    #[serde(default)]
    pub order: Option<i64>,
}

impl InputProperty {
    /// A property callers may leave out: not required, or required with a default.
    pub fn is_optional(&self) -> bool {
        !self.required || self.default.is_some()
    }

    /// Returns a reason if `v` is not a valid value for this property.
    pub fn violation(&self, v: &Value) -> Option<String> {
        if v.is_null() {
            if self.nullable {
                return None;
            }
            return Some(format!("{} must not be null", self.name));
        }
        if !self.ty.accepts(v) {
            if let InputType::Enum { choices, .. } = &self.ty {
                if self.ty.base().accepts(v) {
                    let choices = choices.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
                    return Some(format!("{} must be one of [{choices}], got {v}", self.name));
                }
            }
            return Some(format!("{} must be of type {}, got {v}", self.name, self.ty));
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Some(format!("{} must be >= {min}, got {n}", self.name));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Some(format!("{} must be <= {max}, got {n}", self.name));
                }
            }
        }
        None
    }
}

/// Shape of a version's output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputSpec {
    Scalar {
        ty: String,
        #[serde(default)]
        format: Option<String>,
    },
    Object {
        fields: BTreeMap<String, OutputSpec>,
        #[serde(default)]
        required: Vec<String>,
    },
    Array {
        items: Box<OutputSpec>,
    },
    Any,
}

impl OutputSpec {
    pub fn type_name(&self) -> &str {
        match self {
            OutputSpec::Scalar { ty, .. } => ty,
            OutputSpec::Object { .. } => "object",
            OutputSpec::Array { .. } => "array",
            OutputSpec::Any => "any",
        }
    }
}

/// Input/output contract of one version. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Sorted by `x-order`, then name.
    pub inputs: Vec<InputProperty>,
    pub output: OutputSpec,
}

impl Schema {
    pub fn input(&self, name: &str) -> Option<&InputProperty> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.input(name).is_some()
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &InputProperty> {
        self.inputs.iter().filter(|p| !p.is_optional())
    }
}
