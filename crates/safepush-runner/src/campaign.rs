use std::sync::Arc;
use std::time::Duration;

use safepush_check::CheckContext;
use safepush_client::{PredictionClient, DEFAULT_POLL_INTERVAL};
use safepush_core::{
    Compatibility, Fetcher, ModelPlatform, ModelRef, Oracle, Packager, PackagingLinter, Schema, Verdict, VersionPair,
    VersionRef,
};
use safepush_schema::{compare, lint_descriptions, parse_openapi};
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::cases::CaseRunner;
use crate::config::{Config, Plan};
use crate::error::RunError;
use crate::fuzz::FuzzEngine;
use crate::verdict::{aggregate, Findings};

/// The external collaborators a campaign drives.
#[derive(Clone)]
pub struct Ports {
    pub platform: Arc<dyn ModelPlatform>,
    pub oracle: Arc<dyn Oracle>,
    pub fetcher: Arc<dyn Fetcher>,
    pub linter: Arc<dyn PackagingLinter>,
    pub packager: Arc<dyn Packager>,
}

/// One validation run: lint, push the candidate to the test model, compare
/// schemas, run test cases, fuzz, decide.
pub struct Campaign {
    ports: Ports,
    stop: watch::Receiver<bool>,
    poll_interval: Duration,
}

impl Campaign {
    pub fn new(ports: Ports, stop: watch::Receiver<bool>) -> Self {
        Self {
            ports,
            stop,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    pub async fn run(&self, config: &Config) -> Result<Verdict, RunError> {
        let plan = config.validate()?;
        let findings = Findings::new(Uuid::new_v4().to_string());
        let span = tracing::info_span!("campaign", run_id = %findings.run_id, model = %plan.model);
        self.execute(&plan, findings).instrument(span).await
    }

    async fn execute(&self, plan: &Plan, mut findings: Findings) -> Result<Verdict, RunError> {
        findings.lint.packaging = self.ports.linter.lint().await?;
        if !findings.lint.packaging.is_empty() {
            tracing::warn!(findings = findings.lint.packaging.len(), "packaging lint failed");
        }
        if self.stopped() {
            return Ok(interrupted(findings));
        }

        let versions = self.prepare_versions(plan).await?;
        tracing::info!(
            candidate = %versions.candidate,
            current = ?versions.current.as_ref().map(ToString::to_string),
            "versions ready"
        );

        let candidate_schema = self.schema_of(&versions.candidate).await?;
        findings.lint.schema = lint_descriptions(&candidate_schema);
        findings.compatibility = match &versions.current {
            Some(current) => {
                let current_schema = self.schema_of(current).await?;
                compare(&current_schema, &candidate_schema, plan.ignore_schema_compatibility)
            }
            None => Compatibility::NotApplicable,
        };
        if let Compatibility::Incompatible { violations, ignored } = &findings.compatibility {
            tracing::warn!(?violations, ignored, "schema is incompatible");
        }
        if self.stopped() {
            return Ok(interrupted(findings));
        }

        let predictor = PredictionClient::new(self.ports.platform.clone()).with_poll_interval(self.poll_interval);
        let ctx = CheckContext::new(self.ports.oracle.clone(), self.ports.fetcher.clone());

        let stage = CaseRunner::new(predictor.clone(), ctx.clone(), plan.predict_timeout)
            .run(
                &plan.test_cases,
                &candidate_schema,
                &versions,
                plan.disabled_inputs(),
                plan.compare_outputs,
                &self.stop,
            )
            .await?;
        findings.test_cases = stage.reports;
        findings.comparison = stage.comparison;
        if stage.interrupted || self.stopped() {
            return Ok(interrupted(findings));
        }

        if let Some(fuzz) = &plan.fuzz {
            let summary = FuzzEngine::new(predictor, ctx, plan.predict_timeout, plan.parallel)
                .run(fuzz, &candidate_schema, &versions.candidate, self.stop.clone())
                .await?;
            findings.interrupted = summary.interrupted;
            findings.fuzz = Some(summary);
        }

        let verdict = aggregate(findings);
        match &verdict.blocking_reason {
            None => tracing::info!("validation passed"),
            Some(reason) => tracing::warn!(%reason, "validation failed"),
        }
        Ok(verdict)
    }

    /// Pushes to the real model when the verdict and the config both allow it.
    /// Returns the pushed digest.
    pub async fn publish(&self, config: &Config, verdict: &Verdict) -> Result<Option<String>, RunError> {
        let plan = config.validate()?;
        if !verdict.push {
            tracing::info!("not pushing {}: validation did not pass", plan.model);
            return Ok(None);
        }
        if !plan.push {
            tracing::info!("not pushing {}: push disabled", plan.model);
            return Ok(None);
        }
        let digest = self.ports.packager.push(&plan.model).await?;
        tracing::info!(model = %plan.model, %digest, "pushed");
        Ok(Some(digest))
    }

    async fn prepare_versions(&self, plan: &Plan) -> Result<VersionPair, RunError> {
        let platform = &self.ports.platform;
        let model = platform
            .get_model(&plan.model)
            .await?
            .ok_or_else(|| RunError::ModelNotFound(plan.model.to_string()))?;
        let current = model
            .latest_version
            .map(|id| VersionRef::new(plan.model.clone(), id));

        if platform.get_model(&plan.test_model).await?.is_none() {
            tracing::info!(test_model = %plan.test_model, hardware = %plan.test_hardware, "creating test model");
            platform.create_model(&plan.test_model, &plan.test_hardware).await?;
        }
        let pushed = if plan.skip_test_push {
            tracing::info!("skipping push to {}", plan.test_model);
            None
        } else {
            let digest = self.ports.packager.push(&plan.test_model).await?;
            tracing::info!(test_model = %plan.test_model, %digest, "pushed candidate");
            Some(digest)
        };

        let candidate = latest_version(platform.as_ref(), &plan.test_model).await?;
        if let Some(pushed) = pushed {
            if pushed.trim() != candidate.version_id.trim() {
                return Err(RunError::PushMismatch {
                    model: plan.test_model.to_string(),
                    pushed,
                    latest: candidate.version_id,
                });
            }
        }
        Ok(VersionPair {
            current,
            candidate: VersionRef {
                hardware: Some(plan.test_hardware.clone()),
                ..candidate
            },
        })
    }

    async fn schema_of(&self, version: &VersionRef) -> Result<Schema, RunError> {
        let doc = self.ports.platform.fetch_schema(version).await?;
        parse_openapi(&doc).map_err(|source| RunError::Schema {
            version: version.to_string(),
            source,
        })
    }
}

async fn latest_version(platform: &dyn ModelPlatform, model: &ModelRef) -> Result<VersionRef, RunError> {
    platform
        .get_model(model)
        .await?
        .and_then(|m| m.latest_version)
        .map(|id| VersionRef::new(model.clone(), id))
        .ok_or_else(|| RunError::NoVersion(model.to_string()))
}

fn interrupted(mut findings: Findings) -> Verdict {
    tracing::warn!("stop requested, finishing early");
    findings.interrupted = true;
    aggregate(findings)
}
