use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Final result of one prediction attempt, as seen by the runner and fuzz engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Success { output: Value, latency_ms: u64 },
    Timeout { timeout_secs: u64 },
    /// The model itself raised an error. A finding, not a fault.
    RemoteError { message: String },
    /// Connection or auth failure. `fatal` failures abort the whole run.
    TransportError { message: String, fatal: bool },
}

impl PredictionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PredictionOutcome::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            PredictionOutcome::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, PredictionOutcome::TransportError { fatal: true, .. })
    }

    /// Error text for failed outcomes; `None` on success.
    pub fn error_message(&self) -> Option<String> {
        match self {
            PredictionOutcome::Success { .. } => None,
            PredictionOutcome::Timeout { timeout_secs } => {
                Some(format!("prediction timed out after {timeout_secs}s"))
            }
            PredictionOutcome::RemoteError { message } => Some(message.clone()),
            PredictionOutcome::TransportError { message, .. } => Some(format!("transport error: {message}")),
        }
    }
}

/// Verdict of one check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckResult {
    Pass,
    Fail { reason: String },
    /// Could not be decided, e.g. the oracle was unavailable. Never blocks.
    Inconclusive { reason: String },
}

impl CheckResult {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail { reason: reason.into() }
    }

    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self::Inconclusive { reason: reason.into() }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckResult::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, CheckResult::Fail { .. })
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, CheckResult::Inconclusive { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            CheckResult::Pass => None,
            CheckResult::Fail { reason } | CheckResult::Inconclusive { reason } => Some(reason),
        }
    }
}
