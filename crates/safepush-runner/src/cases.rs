use std::time::Duration;

use safepush_check::{compare_outputs, CheckContext, Evaluate};
use safepush_client::PredictionClient;
use safepush_core::{
    CaseReport, CheckResult, GenerateRequest, Inputs, PredictionOutcome, Schema, TestCase, VersionPair, VersionRef,
};
use safepush_schema::{merge_generated, resolve_inputs};
use tokio::sync::watch;

use crate::error::RunError;

/// Results of the test-case stage.
#[derive(Clone, Debug, Default)]
pub struct CaseStage {
    pub reports: Vec<CaseReport>,
    pub comparison: Option<CaseReport>,
    /// Stopped before every case ran.
    pub interrupted: bool,
}

/// Runs declared test cases one at a time against the candidate.
pub struct CaseRunner {
    predictor: PredictionClient,
    ctx: CheckContext,
    timeout: Duration,
}

impl CaseRunner {
    pub fn new(predictor: PredictionClient, ctx: CheckContext, timeout: Duration) -> Self {
        Self {
            predictor,
            ctx,
            timeout,
        }
    }

    /// Every case runs even when earlier ones fail. `compare` runs the first
    /// case's inputs on the current version too; without declared cases the
    /// comparison inputs come from the oracle.
    pub async fn run(
        &self,
        cases: &[TestCase],
        schema: &Schema,
        versions: &VersionPair,
        disabled: &[String],
        compare: bool,
        stop: &watch::Receiver<bool>,
    ) -> Result<CaseStage, RunError> {
        let mut stage = CaseStage::default();
        let current = versions.current.as_ref().filter(|_| compare);

        if cases.is_empty() {
            if let Some(current) = current {
                if *stop.borrow() {
                    stage.interrupted = true;
                    return Ok(stage);
                }
                stage.comparison = Some(self.generated_comparison(schema, versions, current, disabled).await?);
            }
            return Ok(stage);
        }

        for (index, case) in cases.iter().enumerate() {
            if *stop.borrow() {
                tracing::warn!(remaining = cases.len() - index, "stop requested, skipping remaining test cases");
                stage.interrupted = true;
                break;
            }
            let label = format!("test case {} ({})", index + 1, case.checker);

            let inputs = match resolve_inputs(schema, &case.inputs, disabled) {
                Ok(inputs) => inputs,
                Err(problems) => {
                    let result = CheckResult::fail(format!("Invalid inputs: {}", problems.join("; ")));
                    tracing::info!(%label, ?result, "test case");
                    stage.reports.push(CaseReport {
                        index,
                        label,
                        inputs: case.inputs.clone(),
                        result,
                    });
                    continue;
                }
            };

            let outcome = self.predict(&versions.candidate, &inputs).await?;
            let mut ctx = self.ctx.clone();
            if index == 0 {
                if let Some(current) = current {
                    let baseline = self.predict(current, &inputs).await?;
                    let comparison = self.compare(&outcome, &baseline, &inputs, current).await;
                    if let Some(reference) = baseline.output() {
                        ctx = ctx.with_reference(reference.clone());
                    }
                    stage.comparison = Some(comparison);
                }
            }

            let result = case.checker.evaluate(&outcome, &ctx).await;
            tracing::info!(%label, ?result, "test case");
            stage.reports.push(CaseReport {
                index,
                label,
                inputs,
                result,
            });
        }
        Ok(stage)
    }

    async fn predict(&self, version: &VersionRef, inputs: &Inputs) -> Result<PredictionOutcome, RunError> {
        let outcome = self.predictor.predict(version, inputs, self.timeout).await;
        if outcome.is_fatal() {
            return Err(RunError::Fatal(outcome.error_message().unwrap_or_default()));
        }
        Ok(outcome)
    }

    async fn compare(
        &self,
        candidate: &PredictionOutcome,
        baseline: &PredictionOutcome,
        inputs: &Inputs,
        current: &VersionRef,
    ) -> CaseReport {
        let result = match (candidate, baseline) {
            (PredictionOutcome::Success { output: ours, .. }, PredictionOutcome::Success { output: theirs, .. }) => {
                compare_outputs(ours, theirs, inputs, &self.ctx).await
            }
            (PredictionOutcome::Success { .. }, failed) => CheckResult::inconclusive(format!(
                "Current version prediction failed: {}",
                failed.error_message().unwrap_or_default()
            )),
            (failed, _) => CheckResult::fail(format!(
                "Candidate prediction failed: {}",
                failed.error_message().unwrap_or_default()
            )),
        };
        tracing::info!(%current, ?result, "output comparison");
        CaseReport {
            index: 0,
            label: format!("comparison with {current}"),
            inputs: inputs.clone(),
            result,
        }
    }

    async fn generated_comparison(
        &self,
        schema: &Schema,
        versions: &VersionPair,
        current: &VersionRef,
        disabled: &[String],
    ) -> Result<CaseReport, RunError> {
        let mut fixed = Inputs::new();
        if schema.has_input("seed") && !disabled.iter().any(|d| d == "seed") {
            fixed.insert("seed".into(), serde_json::json!(1));
        }
        let request = GenerateRequest {
            schema: schema.clone(),
            fixed_inputs: fixed.clone(),
            disabled_inputs: disabled.to_vec(),
            only_required: true,
            guidance: None,
            history: vec![],
        };

        let inconclusive = |inputs: Inputs, reason: String| {
            tracing::warn!(%reason, "output comparison skipped");
            CaseReport {
                index: 0,
                label: format!("comparison with {current}"),
                inputs,
                result: CheckResult::inconclusive(reason),
            }
        };

        let generated = match self.ctx.oracle.generate_inputs(request).await {
            Ok(generated) => generated,
            Err(e) => return Ok(inconclusive(Inputs::new(), format!("Could not generate comparison inputs: {e}"))),
        };
        let inputs = match merge_generated(schema, &generated, &fixed, disabled) {
            Ok(inputs) => inputs,
            Err(problems) => {
                return Ok(inconclusive(
                    generated,
                    format!("Generated comparison inputs are invalid: {}", problems.join("; ")),
                ))
            }
        };

        let candidate = self.predict(&versions.candidate, &inputs).await?;
        let baseline = self.predict(current, &inputs).await?;
        Ok(self.compare(&candidate, &baseline, &inputs, current).await)
    }
}
