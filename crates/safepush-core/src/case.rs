use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::Inputs;
use crate::schema::{InputProperty, Schema};

/// How a test case's prediction outcome is judged. Exactly one per case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Checker {
    /// Any successful prediction passes.
    None,
    ExactString(String),
    /// Output must be a URL whose content matches the content at this URL.
    MatchUrl(String),
    /// Output must satisfy this natural-language description.
    MatchPrompt(String),
    /// Query over the JSON output must evaluate truthy.
    JsonQuery(String),
    /// Prediction must fail with an error containing this substring.
    ErrorContains(String),
}

impl Default for Checker {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checker::None => write!(f, "no error"),
            Checker::ExactString(s) => write!(f, "exact string {s:?}"),
            Checker::MatchUrl(u) => write!(f, "matches {u}"),
            Checker::MatchPrompt(p) => write!(f, "matches prompt {p:?}"),
            Checker::JsonQuery(q) => write!(f, "query {q}"),
            Checker::ErrorContains(s) => write!(f, "error containing {s:?}"),
        }
    }
}

/// A declared (inputs, expected result) pair. Never mutated after load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub inputs: Inputs,
    #[serde(default)]
    pub checker: Checker,
}

impl TestCase {
    pub fn new(inputs: Inputs, checker: Checker) -> Self {
        Self { inputs, checker }
    }
}

/// Fuzzing campaign settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuzzConfig {
    /// Supplied verbatim on every iteration.
    #[serde(default)]
    pub fixed_inputs: Inputs,
    /// Never supplied.
    #[serde(default)]
    pub disabled_inputs: Vec<String>,
    /// Wall-clock budget in seconds. Zero disables fuzzing.
    #[serde(default = "default_fuzz_duration")]
    pub duration: u64,
    /// Optional iteration budget; the first bound reached wins.
    #[serde(default)]
    pub iterations: Option<u32>,
    /// Extra guidance for the input-generation oracle.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Additional check applied to successful fuzz predictions.
    #[serde(default)]
    pub constraint: Option<Checker>,
}

pub const DEFAULT_FUZZ_DURATION_SECS: u64 = 300;

fn default_fuzz_duration() -> u64 {
    DEFAULT_FUZZ_DURATION_SECS
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            fixed_inputs: Inputs::new(),
            disabled_inputs: vec![],
            duration: DEFAULT_FUZZ_DURATION_SECS,
            iterations: None,
            prompt: None,
            constraint: None,
        }
    }
}

impl FuzzConfig {
    pub fn is_enabled(&self) -> bool {
        self.duration > 0 && self.iterations != Some(0)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    pub fn is_disabled_input(&self, name: &str) -> bool {
        self.disabled_inputs.iter().any(|d| d == name)
    }

    /// Inputs whose values are generated fresh each iteration.
    pub fn free_inputs<'a>(&'a self, schema: &'a Schema) -> impl Iterator<Item = &'a InputProperty> + 'a {
        schema
            .inputs
            .iter()
            .filter(move |p| !self.fixed_inputs.contains_key(&p.name) && !self.is_disabled_input(&p.name))
    }
}
