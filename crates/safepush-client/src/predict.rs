use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use safepush_core::{
    create_backoff, Inputs, ModelPlatform, PlatformError, PredictionOutcome, RemotePrediction, RemoteStatus,
    VersionRef, CREATE_ATTEMPTS,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runs one prediction to completion against a [`ModelPlatform`].
///
/// Every failure mode is folded into a [`PredictionOutcome`]; callers never
/// see a raw transport error.
#[derive(Clone)]
pub struct PredictionClient {
    platform: Arc<dyn ModelPlatform>,
    poll_interval: Duration,
}

impl PredictionClient {
    pub fn new(platform: Arc<dyn ModelPlatform>) -> Self {
        Self {
            platform,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn platform(&self) -> &Arc<dyn ModelPlatform> {
        &self.platform
    }

    /// Creates the prediction (retrying transient failures), then polls it
    /// until it finishes. `timeout` bounds both steps; on expiry a prediction
    /// that was already created is cancelled and nothing is retried.
    pub async fn predict(&self, version: &VersionRef, inputs: &Inputs, timeout: Duration) -> PredictionOutcome {
        let started = Instant::now();
        tracing::debug!(%version, ?inputs, "predict");

        let mut created: Option<String> = None;
        let result = tokio::time::timeout(timeout, async {
            let id = self.create(version, inputs).await?;
            created = Some(id.clone());
            self.poll(&id).await.map_err(transport_outcome)
        })
        .await;

        match result {
            Ok(Ok(done)) => finish(done, started),
            Ok(Err(outcome)) => outcome,
            Err(_) => {
                match &created {
                    Some(id) => {
                        tracing::warn!(%id, timeout_secs = timeout.as_secs(), "prediction timed out, cancelling");
                        if let Err(e) = self.platform.cancel_prediction(id).await {
                            tracing::warn!(%id, error = %e, "cancel failed");
                        }
                    }
                    None => tracing::warn!(timeout_secs = timeout.as_secs(), "prediction creation timed out"),
                }
                PredictionOutcome::Timeout {
                    timeout_secs: timeout.as_secs(),
                }
            }
        }
    }

    async fn create(&self, version: &VersionRef, inputs: &Inputs) -> Result<String, PredictionOutcome> {
        let mut attempt = 1;
        loop {
            tokio::time::sleep(create_backoff(attempt)).await;
            match self.platform.create_prediction(version, inputs).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_transient() && attempt < CREATE_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "create prediction failed, retrying");
                    attempt += 1;
                }
                // The platform rejects invalid inputs with a 4xx; that is the model's answer.
                Err(PlatformError::Http { status, body }) if (400..500).contains(&status) && status != 429 => {
                    return Err(PredictionOutcome::RemoteError { message: body });
                }
                Err(e) => return Err(transport_outcome(e)),
            }
        }
    }

    async fn poll(&self, id: &str) -> Result<RemotePrediction, PlatformError> {
        loop {
            match self.platform.get_prediction(id).await {
                Ok(p) if p.status.is_terminal() => return Ok(p),
                Ok(p) => tracing::trace!(id, status = ?p.status, "waiting"),
                Err(e) if e.is_transient() => tracing::warn!(id, error = %e, "poll failed, will retry"),
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn finish(p: RemotePrediction, started: Instant) -> PredictionOutcome {
    match p.status {
        RemoteStatus::Succeeded => {
            let latency_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(id = %p.id, latency_ms, "prediction succeeded");
            PredictionOutcome::Success {
                output: p.output.unwrap_or_default(),
                latency_ms,
            }
        }
        RemoteStatus::Canceled => PredictionOutcome::RemoteError {
            message: "prediction was canceled".into(),
        },
        _ => PredictionOutcome::RemoteError {
            message: p.error.unwrap_or_else(|| "prediction failed".into()),
        },
    }
}

fn transport_outcome(e: PlatformError) -> PredictionOutcome {
    PredictionOutcome::TransportError {
        fatal: e.is_fatal(),
        message: e.to_string(),
    }
}
