use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use safepush_core::{
    Inputs, ModelInfo, ModelPlatform, ModelRef, PlatformError, RemotePrediction, RemoteStatus, VersionRef,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub const REPLICATE_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";
pub const DEFAULT_REPLICATE_URL: &str = "https://api.replicate.com";

/// Replicate HTTP API v1.
#[derive(Clone)]
pub struct ReplicateClient {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct WireModel {
    owner: String,
    name: String,
    #[serde(default)]
    latest_version: Option<WireVersion>,
}

#[derive(Deserialize)]
struct WireVersion {
    id: String,
    #[serde(default)]
    openapi_schema: Option<Value>,
}

#[derive(Deserialize)]
struct WirePrediction {
    id: String,
    status: RemoteStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl From<WirePrediction> for RemotePrediction {
    fn from(w: WirePrediction) -> Self {
        let error = match w.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };
        RemotePrediction {
            id: w.id,
            status: w.status,
            output: w.output,
            error,
        }
    }
}

impl ReplicateClient {
    pub fn new(token: impl Into<String>) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: DEFAULT_REPLICATE_URL.to_string(),
            token: token.into(),
        })
    }

    pub fn from_env() -> Result<Self, PlatformError> {
        match std::env::var(REPLICATE_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Self::new(token),
            _ => Err(PlatformError::Unauthorized(format!("{REPLICATE_TOKEN_ENV} is not set"))),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<Response, PlatformError> {
        tracing::debug!(path, "GET");
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        check_status(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Response, PlatformError> {
        tracing::debug!(path, "POST");
        tracing::trace!(%body, "request body");
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        check_status(resp).await
    }
}

/// Maps non-2xx responses onto the platform error taxonomy.
async fn check_status(resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

pub fn classify_status(status: u16, body: String) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Unauthorized(body),
        404 => PlatformError::NotFound(body),
        _ => PlatformError::Http { status, body },
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, PlatformError> {
    resp.json::<T>()
        .await
        .map_err(|e| PlatformError::Decode(e.to_string()))
}

#[async_trait]
impl ModelPlatform for ReplicateClient {
    async fn get_model(&self, model: &ModelRef) -> Result<Option<ModelInfo>, PlatformError> {
        let resp = match self.get(&format!("models/{}/{}", model.owner, model.name)).await {
            Ok(resp) => resp,
            Err(PlatformError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let wire: WireModel = decode(resp).await?;
        Ok(Some(ModelInfo {
            model: ModelRef::new(wire.owner, wire.name),
            latest_version: wire.latest_version.map(|v| v.id),
        }))
    }

    async fn create_model(&self, model: &ModelRef, hardware: &str) -> Result<ModelInfo, PlatformError> {
        tracing::info!(%model, hardware, "creating model");
        let body = json!({
            "owner": model.owner,
            "name": model.name,
            "visibility": "private",
            "hardware": hardware,
        });
        let wire: WireModel = decode(self.post("models", &body).await?).await?;
        Ok(ModelInfo {
            model: ModelRef::new(wire.owner, wire.name),
            latest_version: wire.latest_version.map(|v| v.id),
        })
    }

    async fn fetch_schema(&self, version: &VersionRef) -> Result<Value, PlatformError> {
        let path = format!(
            "models/{}/{}/versions/{}",
            version.model.owner, version.model.name, version.version_id
        );
        let wire: WireVersion = decode(self.get(&path).await?).await?;
        wire.openapi_schema
            .ok_or_else(|| PlatformError::Decode(format!("version {version} has no openapi_schema")))
    }

    async fn create_prediction(&self, version: &VersionRef, inputs: &Inputs) -> Result<String, PlatformError> {
        let body = json!({ "version": version.version_id, "input": inputs });
        let wire: WirePrediction = decode(self.post("predictions", &body).await?).await?;
        tracing::debug!(id = %wire.id, %version, "prediction created");
        Ok(wire.id)
    }

    async fn get_prediction(&self, id: &str) -> Result<RemotePrediction, PlatformError> {
        let wire: WirePrediction = decode(self.get(&format!("predictions/{id}")).await?).await?;
        Ok(wire.into())
    }

    async fn cancel_prediction(&self, id: &str) -> Result<(), PlatformError> {
        self.post(&format!("predictions/{id}/cancel"), &json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_fatal() {
        assert!(classify_status(401, String::new()).is_fatal());
        assert!(classify_status(403, String::new()).is_fatal());
        assert!(matches!(classify_status(404, String::new()), PlatformError::NotFound(_)));
        assert!(classify_status(502, String::new()).is_transient());
        assert!(!classify_status(422, String::new()).is_transient());
    }

    #[test]
    fn wire_prediction_error_is_flattened() {
        let w: WirePrediction = serde_json::from_value(json!({
            "id": "p1",
            "status": "failed",
            "error": {"detail": "CUDA OOM"}
        }))
        .unwrap();
        let p: RemotePrediction = w.into();
        assert_eq!(p.status, RemoteStatus::Failed);
        assert_eq!(p.error.as_deref(), Some(r#"{"detail":"CUDA OOM"}"#));

        let w: WirePrediction =
            serde_json::from_value(json!({"id": "p2", "status": "succeeded", "output": ["a"], "error": null})).unwrap();
        let p: RemotePrediction = w.into();
        assert_eq!(p.error, None);
        assert_eq!(p.output, Some(json!(["a"])));
    }

    #[test]
    fn base_url_is_normalized() {
        let c = ReplicateClient::new("t").unwrap().with_base_url("http://localhost:9/");
        assert_eq!(c.url("models"), "http://localhost:9/v1/models");
    }
}
