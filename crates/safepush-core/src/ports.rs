//! Boundaries to the external collaborators the engine drives.
//!
//! Each port has one network-backed implementation in `safepush-client` and
//! deterministic doubles in the test suites.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, OracleError, PackagingError, PlatformError};
use crate::model::{Inputs, ModelRef, VersionRef};
use crate::schema::Schema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model: ModelRef,
    /// Id of the most recently pushed version, if any.
    pub latest_version: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl RemoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RemoteStatus::Succeeded | RemoteStatus::Failed | RemoteStatus::Canceled)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemotePrediction {
    pub id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Model hosting and versioning platform.
#[async_trait]
pub trait ModelPlatform: Send + Sync {
    /// `Ok(None)` when the model does not exist.
    async fn get_model(&self, model: &ModelRef) -> Result<Option<ModelInfo>, PlatformError>;

    async fn create_model(&self, model: &ModelRef, hardware: &str) -> Result<ModelInfo, PlatformError>;

    /// Raw OpenAPI document of a version.
    async fn fetch_schema(&self, version: &VersionRef) -> Result<serde_json::Value, PlatformError>;

    /// Starts a prediction and returns its id.
    async fn create_prediction(&self, version: &VersionRef, inputs: &Inputs) -> Result<String, PlatformError>;

    async fn get_prediction(&self, id: &str) -> Result<RemotePrediction, PlatformError>;

    async fn cancel_prediction(&self, id: &str) -> Result<(), PlatformError>;
}

/// A media file handed to the oracle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct JudgeRequest {
    pub instruction: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub equivalent: bool,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub schema: Schema,
    pub fixed_inputs: Inputs,
    pub disabled_inputs: Vec<String>,
    /// Ask for required inputs only (used for the comparison case).
    pub only_required: bool,
    pub guidance: Option<String>,
    /// Earlier generated sets, so new ones can differ from them.
    pub history: Vec<Inputs>,
}

/// AI judging and input-generation service.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn judge(&self, request: JudgeRequest) -> Result<Judgement, OracleError>;

    async fn generate_inputs(&self, request: GenerateRequest) -> Result<Inputs, OracleError>;
}

/// Downloads media referenced by outputs and test cases.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Attachment, FetchError>;
}

/// Linter for the packaging files. `Ok(findings)`; empty means clean.
#[async_trait]
pub trait PackagingLinter: Send + Sync {
    async fn lint(&self) -> Result<Vec<String>, PackagingError>;
}

/// Build tool that pushes the packaged model and returns the pushed digest.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn push(&self, model: &ModelRef) -> Result<String, PackagingError>;
}
