use safepush_core::{ConfigError, PackagingError, PlatformError};
use safepush_schema::SchemaError;
use thiserror::Error;

/// Systemic failures that stop a campaign. Findings about the model itself
/// never end up here; they are recorded in the verdict.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("platform: {0}")]
    Platform(#[from] PlatformError),
    #[error("schema of {version}: {source}")]
    Schema {
        version: String,
        #[source]
        source: SchemaError,
    },
    #[error("packaging: {0}")]
    Packaging(#[from] PackagingError),
    #[error("model {0} does not exist")]
    ModelNotFound(String),
    #[error("model {0} has no versions")]
    NoVersion(String),
    #[error("pushed version {pushed} doesn't match latest version on {model}: {latest}")]
    PushMismatch {
        model: String,
        pushed: String,
        latest: String,
    },
    /// Credentials were rejected mid-run; every later call would fail too.
    #[error("fatal transport error: {0}")]
    Fatal(String),
}
