use serde::{Deserialize, Serialize};

use crate::model::Inputs;
use crate::outcome::CheckResult;

/// Packaging lint plus schema description lint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintReport {
    pub packaging: Vec<String>,
    pub schema: Vec<String>,
}

impl LintReport {
    pub fn passed(&self) -> bool {
        self.packaging.is_empty() && self.schema.is_empty()
    }

    pub fn findings(&self) -> impl Iterator<Item = &String> {
        self.packaging.iter().chain(self.schema.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Compatibility {
    /// No prior version to compare against.
    NotApplicable,
    Compatible,
    /// `ignored` is set when the operator overrode the check.
    Incompatible { violations: Vec<String>, ignored: bool },
}

impl Compatibility {
    pub fn blocks(&self) -> bool {
        matches!(self, Compatibility::Incompatible { ignored: false, .. })
    }
}

/// Result of one explicit test case or the implicit comparison case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Position in declared order (0-based).
    pub index: usize,
    pub label: String,
    pub inputs: Inputs,
    pub result: CheckResult,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuzzFailure {
    pub iteration: u32,
    pub inputs: Inputs,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzSummary {
    pub iterations: u32,
    pub failures: u32,
    pub inconclusive: u32,
    pub elapsed_ms: u64,
    /// Lowest-index failures first.
    pub samples: Vec<FuzzFailure>,
    /// Stopped early by an interrupt.
    pub interrupted: bool,
}

/// Aggregate of a whole campaign and the push decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub run_id: String,
    /// Unix epoch milliseconds.
    pub started_ms: i64,
    pub lint: LintReport,
    pub compatibility: Compatibility,
    pub test_cases: Vec<CaseReport>,
    pub comparison: Option<CaseReport>,
    pub fuzz: Option<FuzzSummary>,
    /// The run was interrupted before all stages finished.
    pub incomplete: bool,
    pub push: bool,
    pub blocking_reason: Option<String>,
}

impl Verdict {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Every inconclusive check, for the "re-check by hand" section of the report.
    pub fn inconclusive(&self) -> Vec<&CaseReport> {
        self.test_cases
            .iter()
            .chain(self.comparison.iter())
            .filter(|c| c.result.is_inconclusive())
            .collect()
    }
}
