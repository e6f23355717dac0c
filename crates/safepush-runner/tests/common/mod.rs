#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use safepush_core::{
    Attachment, FetchError, Fetcher, GenerateRequest, Inputs, JudgeRequest, Judgement, ModelInfo, ModelPlatform,
    ModelRef, Oracle, OracleError, Packager, PackagingError, PackagingLinter, PlatformError, RemotePrediction,
    RemoteStatus, VersionRef,
};
use safepush_runner::{Campaign, Config, Ports};
use serde_json::{json, Value};
use tokio::sync::watch;

pub const CURRENT: &str = "v1";
pub const CANDIDATE: &str = "v2";

/// How the stub platform answers a prediction.
#[derive(Clone, Debug)]
pub enum Behavior {
    Succeed { output: Value, polls: usize },
    Fail(String),
    Hang,
    Unauthorized,
}

pub type BehaviorFn = dyn Fn(&str, &Inputs) -> Behavior + Send + Sync;

struct Running {
    behavior: Behavior,
    polls_left: usize,
}

/// In-memory platform: two models, fixed schemas, scripted predictions.
pub struct StubPlatform {
    models: Mutex<HashMap<String, ModelInfo>>,
    schemas: HashMap<String, Value>,
    behavior: Box<BehaviorFn>,
    running: Mutex<HashMap<String, Running>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub created: Mutex<Vec<(String, Inputs)>>,
    pub cancelled: Mutex<Vec<String>>,
    pub created_models: Mutex<Vec<(String, String)>>,
}

impl StubPlatform {
    /// `acme/flux` at `v1` and `acme/flux-test` at `v2`, both with `schema`.
    pub fn new(schema: Value, behavior: impl Fn(&str, &Inputs) -> Behavior + Send + Sync + 'static) -> Self {
        Self::with_schemas(schema.clone(), schema, behavior)
    }

    pub fn with_schemas(
        current: Value,
        candidate: Value,
        behavior: impl Fn(&str, &Inputs) -> Behavior + Send + Sync + 'static,
    ) -> Self {
        let models = HashMap::from([
            (
                "acme/flux".to_string(),
                ModelInfo {
                    model: ModelRef::new("acme", "flux"),
                    latest_version: Some(CURRENT.into()),
                },
            ),
            (
                "acme/flux-test".to_string(),
                ModelInfo {
                    model: ModelRef::new("acme", "flux-test"),
                    latest_version: Some(CANDIDATE.into()),
                },
            ),
        ]);
        Self {
            models: Mutex::new(models),
            schemas: HashMap::from([(CURRENT.to_string(), current), (CANDIDATE.to_string(), candidate)]),
            behavior: Box::new(behavior),
            running: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            created: Mutex::new(vec![]),
            cancelled: Mutex::new(vec![]),
            created_models: Mutex::new(vec![]),
        }
    }

    pub fn without_model(self, model: &str) -> Self {
        self.models.lock().unwrap().remove(model);
        self
    }

    pub fn predictions_on(&self, version: &str) -> usize {
        self.created.lock().unwrap().iter().filter(|(v, _)| v == version).count()
    }

    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelPlatform for StubPlatform {
    async fn get_model(&self, model: &ModelRef) -> Result<Option<ModelInfo>, PlatformError> {
        Ok(self.models.lock().unwrap().get(&model.to_string()).cloned())
    }

    async fn create_model(&self, model: &ModelRef, hardware: &str) -> Result<ModelInfo, PlatformError> {
        self.created_models
            .lock()
            .unwrap()
            .push((model.to_string(), hardware.to_string()));
        let info = ModelInfo {
            model: model.clone(),
            latest_version: Some(CANDIDATE.into()),
        };
        self.models.lock().unwrap().insert(model.to_string(), info.clone());
        Ok(info)
    }

    async fn fetch_schema(&self, version: &VersionRef) -> Result<Value, PlatformError> {
        self.schemas
            .get(&version.version_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(version.to_string()))
    }

    async fn create_prediction(&self, version: &VersionRef, inputs: &Inputs) -> Result<String, PlatformError> {
        let behavior = (self.behavior)(&version.version_id, inputs);
        if let Behavior::Unauthorized = behavior {
            return Err(PlatformError::Unauthorized("token revoked".into()));
        }
        self.created
            .lock()
            .unwrap()
            .push((version.version_id.clone(), inputs.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let polls_left = match &behavior {
            Behavior::Succeed { polls, .. } => *polls,
            _ => 0,
        };
        self.running
            .lock()
            .unwrap()
            .insert(id.clone(), Running { behavior, polls_left });
        Ok(id)
    }

    async fn get_prediction(&self, id: &str) -> Result<RemotePrediction, PlatformError> {
        let mut running = self.running.lock().unwrap();
        let run = running
            .get_mut(id)
            .ok_or_else(|| PlatformError::NotFound(id.into()))?;
        let processing = RemotePrediction {
            id: id.into(),
            status: RemoteStatus::Processing,
            output: None,
            error: None,
        };
        let done = match &run.behavior {
            Behavior::Hang => None,
            Behavior::Succeed { .. } if run.polls_left > 0 => {
                run.polls_left -= 1;
                None
            }
            Behavior::Succeed { output, .. } => Some(RemotePrediction {
                status: RemoteStatus::Succeeded,
                output: Some(output.clone()),
                ..processing.clone()
            }),
            Behavior::Fail(message) => Some(RemotePrediction {
                status: RemoteStatus::Failed,
                error: Some(message.clone()),
                ..processing.clone()
            }),
            Behavior::Unauthorized => return Err(PlatformError::Unauthorized("token revoked".into())),
        };
        match done {
            None => Ok(processing),
            Some(done) => {
                running.remove(id);
                self.finish();
                Ok(done)
            }
        }
    }

    async fn cancel_prediction(&self, id: &str) -> Result<(), PlatformError> {
        self.cancelled.lock().unwrap().push(id.into());
        if self.running.lock().unwrap().remove(id).is_some() {
            self.finish();
        }
        Ok(())
    }
}

/// Judges everything equivalent; generates `{"prompt": "fuzz-<n>"}` sets.
#[derive(Default)]
pub struct StubOracle {
    pub generated: AtomicUsize,
    pub requests: Mutex<Vec<GenerateRequest>>,
    pub generate_fails: bool,
}

#[async_trait]
impl Oracle for StubOracle {
    async fn judge(&self, _: JudgeRequest) -> Result<Judgement, OracleError> {
        Ok(Judgement {
            equivalent: true,
            reasoning: "same".into(),
        })
    }

    async fn generate_inputs(&self, request: GenerateRequest) -> Result<Inputs, OracleError> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        if self.generate_fails {
            return Err(OracleError::Unavailable("503".into()));
        }
        Ok(Inputs::from([("prompt".to_string(), json!(format!("fuzz-{n}")))]))
    }
}

pub struct StubFetcher;

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Attachment, FetchError> {
        Ok(Attachment {
            name: url.rsplit('/').next().unwrap_or(url).to_string(),
            media_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        })
    }
}

#[derive(Default)]
pub struct StubLinter {
    pub findings: Vec<String>,
}

#[async_trait]
impl PackagingLinter for StubLinter {
    async fn lint(&self) -> Result<Vec<String>, PackagingError> {
        Ok(self.findings.clone())
    }
}

/// Reports `digest` (the candidate version by default) for every push.
#[derive(Default)]
pub struct StubPackager {
    pub pushed: Mutex<Vec<String>>,
    pub digest: Option<String>,
}

#[async_trait]
impl Packager for StubPackager {
    async fn push(&self, model: &ModelRef) -> Result<String, PackagingError> {
        self.pushed.lock().unwrap().push(model.to_string());
        Ok(self.digest.clone().unwrap_or_else(|| CANDIDATE.into()))
    }
}

/// Input `prompt` (required) and `seed` (optional), string output.
pub fn text_schema() -> Value {
    json!({
        "components": {
            "schemas": {
                "Input": {
                    "type": "object",
                    "required": ["prompt"],
                    "properties": {
                        "prompt": {"type": "string", "description": "What to say", "x-order": 0},
                        "seed": {"type": "integer", "description": "Random seed", "x-order": 1}
                    }
                },
                "Output": {"type": "string"}
            }
        }
    })
}

pub fn echo(polls: usize) -> impl Fn(&str, &Inputs) -> Behavior + Send + Sync + 'static {
    move |_, inputs| Behavior::Succeed {
        output: inputs.get("prompt").cloned().unwrap_or(Value::Null),
        polls,
    }
}

pub struct Harness {
    pub platform: Arc<StubPlatform>,
    pub oracle: Arc<StubOracle>,
    pub packager: Arc<StubPackager>,
    pub stop: watch::Sender<bool>,
    pub campaign: Campaign,
}

pub fn harness(platform: StubPlatform, oracle: StubOracle, linter: StubLinter) -> Harness {
    harness_with_packager(platform, oracle, linter, StubPackager::default())
}

pub fn harness_with_packager(
    platform: StubPlatform,
    oracle: StubOracle,
    linter: StubLinter,
    packager: StubPackager,
) -> Harness {
    let platform = Arc::new(platform);
    let oracle = Arc::new(oracle);
    let packager = Arc::new(packager);
    let (stop, stop_rx) = watch::channel(false);
    let ports = Ports {
        platform: platform.clone(),
        oracle: oracle.clone(),
        fetcher: Arc::new(StubFetcher),
        linter: Arc::new(linter),
        packager: packager.clone(),
    };
    let campaign = Campaign::new(ports, stop_rx).with_poll_interval(Duration::from_millis(100));
    Harness {
        platform,
        oracle,
        packager,
        stop,
        campaign,
    }
}

pub fn config() -> Config {
    let mut cfg = Config::for_model("acme/flux");
    cfg.predict.predict_timeout = 5;
    cfg
}
