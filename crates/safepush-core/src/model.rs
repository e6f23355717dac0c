use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Input payload for one prediction. Ordered so logs and fingerprints are stable.
pub type Inputs = BTreeMap<String, serde_json::Value>;

/// `owner/name` reference to a model on the hosting platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
}

impl ModelRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parses `owner/name`. Owners may contain `_`, names may not.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN
            .get_or_init(|| Regex::new(r"^([a-z0-9_-]+)/([a-z0-9-]+)$").expect("valid model pattern"));
        let caps = re
            .captures(s.trim())
            .ok_or_else(|| ConfigError::Invalid(format!("invalid model reference: {s}")))?;
        Ok(Self::new(&caps[1], &caps[2]))
    }

    /// Default test model: same owner, `-test` suffix.
    pub fn test_counterpart(&self) -> Self {
        Self::new(self.owner.clone(), format!("{}-test", self.name))
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One deployed, prediction-capable version of a model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub model: ModelRef,
    pub version_id: String,
    /// Hardware tier label, only known for models this tool created.
    #[serde(default)]
    pub hardware: Option<String>,
}

impl VersionRef {
    pub fn new(model: ModelRef, version_id: impl Into<String>) -> Self {
        Self {
            model,
            version_id: version_id.into(),
            hardware: None,
        }
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.version_id)
    }
}

/// The pair of versions a campaign validates.
#[derive(Clone, Debug)]
pub struct VersionPair {
    /// Previously published version; absent for a model's first push.
    pub current: Option<VersionRef>,
    pub candidate: VersionRef,
}
