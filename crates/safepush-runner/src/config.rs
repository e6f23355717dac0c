use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use safepush_check::Query;
use safepush_core::{Checker, ConfigError, FuzzConfig, Inputs, ModelRef, TestCase};

pub const DEFAULT_CONFIG_FILE: &str = "safe-push.yaml";
pub const DEFAULT_TEST_HARDWARE: &str = "cpu";
pub const DEFAULT_PREDICT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PARALLEL: usize = 4;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub model: String,
    /// Defaults to `<model>-test` under the same owner.
    #[serde(default)]
    pub test_model: Option<String>,
    #[serde(default = "default_test_hardware")]
    pub test_hardware: String,
    /// Push to the real model when validation passes.
    #[serde(default = "default_true")]
    pub push: bool,
    #[serde(default)]
    pub skip_test_push: bool,
    #[serde(default)]
    pub ignore_schema_compatibility: bool,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default)]
    pub predict: PredictConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictConfig {
    #[serde(default = "default_true")]
    pub compare_outputs: bool,
    /// Seconds.
    #[serde(default = "default_predict_timeout")]
    pub predict_timeout: u64,
    #[serde(default)]
    pub test_cases: Vec<TestCaseConfig>,
    #[serde(default)]
    pub fuzz: Option<FuzzConfig>,
}

/// One test case as written in the config file. At most one checker key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TestCaseConfig {
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jq_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_contains: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_test_hardware() -> String {
    DEFAULT_TEST_HARDWARE.to_string()
}

fn default_predict_timeout() -> u64 {
    DEFAULT_PREDICT_TIMEOUT_SECS
}

fn default_parallel() -> usize {
    DEFAULT_PARALLEL
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            compare_outputs: true,
            predict_timeout: DEFAULT_PREDICT_TIMEOUT_SECS,
            test_cases: vec![],
            fuzz: None,
        }
    }
}

/// A validated config, ready to drive a campaign.
#[derive(Clone, Debug)]
pub struct Plan {
    pub model: ModelRef,
    pub test_model: ModelRef,
    pub test_hardware: String,
    pub push: bool,
    pub skip_test_push: bool,
    pub ignore_schema_compatibility: bool,
    pub parallel: usize,
    pub compare_outputs: bool,
    pub predict_timeout: Duration,
    pub test_cases: Vec<TestCase>,
    /// `None` when fuzzing is absent or has a zero budget.
    pub fuzz: Option<FuzzConfig>,
}

impl Plan {
    /// Inputs never supplied to any prediction.
    pub fn disabled_inputs(&self) -> &[String] {
        self.fuzz.as_ref().map(|f| f.disabled_inputs.as_slice()).unwrap_or(&[])
    }
}

impl Config {
    pub fn for_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            test_model: None,
            test_hardware: default_test_hardware(),
            push: true,
            skip_test_push: false,
            ignore_schema_compatibility: false,
            parallel: DEFAULT_PARALLEL,
            predict: PredictConfig::default(),
        }
    }

    /// YAML unless the file name ends in `.toml`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = if path.extension().is_some_and(|e| e == "toml") {
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?
        } else {
            serde_yaml::from_str(&s).with_context(|| format!("parse {}", path.display()))?
        };
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = if path.extension().is_some_and(|e| e == "toml") {
            toml::to_string_pretty(self).with_context(|| "serialize toml")?
        } else {
            serde_yaml::to_string(self).with_context(|| "serialize yaml")?
        };
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<Plan, ConfigError> {
        let model = ModelRef::parse(&self.model)?;
        let test_model = match &self.test_model {
            Some(t) => ModelRef::parse(t)?,
            None => model.test_counterpart(),
        };
        if model == test_model {
            return Err(ConfigError::Invalid(format!("test model must differ from model {model}")));
        }
        if self.parallel == 0 {
            return Err(ConfigError::Invalid("parallel must be at least 1".into()));
        }
        if self.predict.predict_timeout == 0 {
            return Err(ConfigError::Invalid("predict_timeout must be positive".into()));
        }

        let test_cases = self
            .predict
            .test_cases
            .iter()
            .enumerate()
            .map(|(i, tc)| tc.to_test_case(i + 1))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(fuzz) = &self.predict.fuzz {
            if let Some(name) = fuzz.disabled_inputs.iter().find(|d| fuzz.fixed_inputs.contains_key(*d)) {
                return Err(ConfigError::Invalid(format!("input {name} is both fixed and disabled")));
            }
            if let Some(Checker::JsonQuery(q)) = &fuzz.constraint {
                Query::parse(q).map_err(|e| ConfigError::Invalid(format!("fuzz constraint: {e}")))?;
            }
        }

        Ok(Plan {
            model,
            test_model,
            test_hardware: self.test_hardware.clone(),
            push: self.push,
            skip_test_push: self.skip_test_push,
            ignore_schema_compatibility: self.ignore_schema_compatibility,
            parallel: self.parallel,
            compare_outputs: self.predict.compare_outputs,
            predict_timeout: Duration::from_secs(self.predict.predict_timeout),
            test_cases,
            fuzz: self.predict.fuzz.clone().filter(FuzzConfig::is_enabled),
        })
    }
}

impl TestCaseConfig {
    /// `index` is 1-based, for messages.
    pub fn to_test_case(&self, index: usize) -> Result<TestCase, ConfigError> {
        let set: Vec<(&str, &String)> = [
            ("exact_string", &self.exact_string),
            ("match_url", &self.match_url),
            ("match_prompt", &self.match_prompt),
            ("jq_query", &self.jq_query),
            ("error_contains", &self.error_contains),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
        .collect();

        let checker = match set.as_slice() {
            [] => Checker::None,
            [("exact_string", v)] => Checker::ExactString((*v).clone()),
            [("match_url", v)] => Checker::MatchUrl((*v).clone()),
            [("match_prompt", v)] => Checker::MatchPrompt((*v).clone()),
            [("error_contains", v)] => Checker::ErrorContains((*v).clone()),
            [(_, q)] => {
                Query::parse(q).map_err(|e| ConfigError::InvalidQuery {
                    index,
                    message: e.to_string(),
                })?;
                Checker::JsonQuery((*q).clone())
            }
            many => {
                let keys: Vec<&str> = many.iter().map(|(k, _)| *k).collect();
                return Err(ConfigError::ConflictingCheckers {
                    index,
                    keys: keys.join(", "),
                });
            }
        };
        Ok(TestCase::new(self.inputs.clone(), checker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(inputs: serde_json::Value) -> TestCaseConfig {
        TestCaseConfig {
            inputs: serde_json::from_value(inputs).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: Config = serde_yaml::from_str("model: acme/flux\n").unwrap();
        assert_eq!(cfg.test_hardware, "cpu");
        assert!(cfg.push);
        assert_eq!(cfg.parallel, 4);
        assert!(cfg.predict.compare_outputs);
        assert_eq!(cfg.predict.predict_timeout, 300);

        let plan = cfg.validate().unwrap();
        assert_eq!(plan.test_model, ModelRef::new("acme", "flux-test"));
        assert!(plan.fuzz.is_none());
    }

    #[test]
    fn model_and_test_model_must_differ() {
        let mut cfg = Config::for_model("acme/flux");
        cfg.test_model = Some("acme/flux".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn fixed_and_disabled_must_not_overlap() {
        let mut cfg = Config::for_model("acme/flux");
        let mut fuzz = FuzzConfig::default();
        fuzz.fixed_inputs.insert("seed".into(), json!(1));
        fuzz.disabled_inputs.push("seed".into());
        cfg.predict.fuzz = Some(fuzz);
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.to_string(), "input seed is both fixed and disabled");
    }

    #[test]
    fn checker_keys_map_to_variants() {
        let mut tc = case(json!({"prompt": "hi"}));
        tc.match_prompt = Some("a greeting".into());
        assert_eq!(tc.to_test_case(1).unwrap().checker, Checker::MatchPrompt("a greeting".into()));

        let tc = case(json!({}));
        assert_eq!(tc.to_test_case(1).unwrap().checker, Checker::None);
    }

    #[test]
    fn bad_query_is_rejected() {
        let mut tc = case(json!({}));
        tc.jq_query = Some(".a ==".into());
        assert!(matches!(tc.to_test_case(3), Err(ConfigError::InvalidQuery { index: 3, .. })));
    }

    #[test]
    fn zero_duration_fuzz_is_dropped() {
        let mut cfg = Config::for_model("acme/flux");
        cfg.predict.fuzz = Some(FuzzConfig {
            duration: 0,
            ..Default::default()
        });
        assert!(cfg.validate().unwrap().fuzz.is_none());
    }
}
