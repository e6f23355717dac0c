use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use safepush_check::{CheckContext, Evaluate};
use safepush_client::PredictionClient;
use safepush_core::{
    inputs_fingerprint, CheckResult, FuzzConfig, FuzzFailure, FuzzSummary, GenerateRequest, Inputs, PredictionOutcome,
    Schema, VersionRef,
};
use safepush_schema::merge_generated;
use serde_json::Value;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::RunError;

pub const MAX_FAILURE_SAMPLES: usize = 5;

#[derive(Clone, Debug)]
struct Iteration {
    index: u32,
    inputs: Inputs,
    result: CheckResult,
    fatal: Option<String>,
}

/// Shared by every worker of one fuzz run.
struct Shared {
    predictor: PredictionClient,
    ctx: CheckContext,
    schema: Schema,
    candidate: VersionRef,
    config: FuzzConfig,
    timeout: Duration,
    history: Mutex<Vec<Inputs>>,
    seen: Mutex<HashSet<String>>,
}

/// Bounded, concurrent fuzzing of the candidate version.
pub struct FuzzEngine {
    predictor: PredictionClient,
    ctx: CheckContext,
    timeout: Duration,
    parallel: usize,
}

impl FuzzEngine {
    pub fn new(predictor: PredictionClient, ctx: CheckContext, timeout: Duration, parallel: usize) -> Self {
        Self {
            predictor,
            ctx,
            timeout,
            parallel: parallel.max(1),
        }
    }

    /// Dispatches iterations until the iteration budget, the duration budget
    /// or the stop signal says otherwise, then waits for in-flight ones.
    pub async fn run(
        &self,
        config: &FuzzConfig,
        schema: &Schema,
        candidate: &VersionRef,
        mut stop: watch::Receiver<bool>,
    ) -> Result<FuzzSummary, RunError> {
        let started = Instant::now();
        let deadline = started + config.time_budget();
        let max_iterations = config.iterations.unwrap_or(u32::MAX);
        tracing::info!(
            duration_secs = config.duration,
            iterations = ?config.iterations,
            parallel = self.parallel,
            "fuzzing {candidate}"
        );
        if config.free_inputs(schema).next().is_none() {
            tracing::warn!("every input is fixed or disabled, fuzz iterations will repeat the same prediction");
        }

        let shared = Arc::new(Shared {
            predictor: self.predictor.clone(),
            ctx: self.ctx.clone(),
            schema: schema.clone(),
            candidate: candidate.clone(),
            config: config.clone(),
            timeout: self.timeout,
            history: Mutex::new(vec![]),
            seen: Mutex::new(HashSet::new()),
        });
        let semaphore = Arc::new(Semaphore::new(self.parallel));
        let mut workers: JoinSet<Iteration> = JoinSet::new();
        let mut done: Vec<Iteration> = vec![];
        let mut dispatched: u32 = 0;
        let mut interrupted = false;
        let mut stop_open = true;

        'dispatch: while dispatched < max_iterations {
            if *stop.borrow() {
                interrupted = true;
                break;
            }
            if done.iter().any(|it| it.fatal.is_some()) {
                break;
            }

            let permit: OwnedSemaphorePermit = loop {
                tokio::select! {
                    biased;
                    changed = stop.changed(), if stop_open => {
                        if changed.is_err() {
                            stop_open = false;
                        } else if *stop.borrow() {
                            interrupted = true;
                            break 'dispatch;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break 'dispatch,
                    Some(joined) = workers.join_next(), if !workers.is_empty() => {
                        if let Some(it) = collect(joined) {
                            let fatal = it.fatal.is_some();
                            done.push(it);
                            if fatal {
                                break 'dispatch;
                            }
                        }
                    }
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => break 'dispatch,
                    },
                }
            };

            dispatched += 1;
            tracing::debug!(iteration = dispatched, state = "dispatch", "fuzz");
            workers.spawn(iterate(dispatched, shared.clone(), permit));
        }

        let pending = workers.len();
        if pending > 0 {
            tracing::debug!(pending, "waiting for in-flight fuzz iterations");
        }
        while let Some(joined) = workers.join_next().await {
            if let Some(it) = collect(joined) {
                done.push(it);
            }
        }

        done.sort_by_key(|it| it.index);
        if let Some(fatal) = done.iter().find_map(|it| it.fatal.clone()) {
            return Err(RunError::Fatal(fatal));
        }

        let summary = summarize(&done, started.elapsed(), interrupted);
        tracing::info!(
            iterations = summary.iterations,
            failures = summary.failures,
            inconclusive = summary.inconclusive,
            elapsed_ms = summary.elapsed_ms,
            "fuzzing done"
        );
        Ok(summary)
    }
}

fn collect(joined: Result<Iteration, tokio::task::JoinError>) -> Option<Iteration> {
    match joined {
        Ok(it) => Some(it),
        Err(e) => {
            tracing::error!(error = %e, "fuzz worker panicked");
            None
        }
    }
}

fn summarize(done: &[Iteration], elapsed: Duration, interrupted: bool) -> FuzzSummary {
    let failures: Vec<&Iteration> = done.iter().filter(|it| it.result.is_fail()).collect();
    FuzzSummary {
        iterations: done.len() as u32,
        failures: failures.len() as u32,
        inconclusive: done.iter().filter(|it| it.result.is_inconclusive()).count() as u32,
        elapsed_ms: elapsed.as_millis() as u64,
        samples: failures
            .iter()
            .take(MAX_FAILURE_SAMPLES)
            .map(|it| FuzzFailure {
                iteration: it.index,
                inputs: it.inputs.clone(),
                reason: it.result.reason().unwrap_or_default().to_string(),
            })
            .collect(),
        interrupted,
    }
}

/// One generate → predict → check cycle. Holds its permit until done.
async fn iterate(index: u32, shared: Arc<Shared>, permit: OwnedSemaphorePermit) -> Iteration {
    let _permit = permit;
    let cfg = &shared.config;

    tracing::debug!(iteration = index, state = "generating", "fuzz");
    let history = shared.history.lock().map(|h| h.clone()).unwrap_or_default();
    let request = GenerateRequest {
        schema: shared.schema.clone(),
        fixed_inputs: cfg.fixed_inputs.clone(),
        disabled_inputs: cfg.disabled_inputs.clone(),
        only_required: false,
        guidance: cfg.prompt.clone(),
        history,
    };
    let generated = match shared.ctx.oracle.generate_inputs(request).await {
        Ok(generated) => generated,
        Err(e) => {
            tracing::warn!(iteration = index, error = %e, "input generation failed");
            return finished(index, Inputs::new(), CheckResult::inconclusive(format!("Input generation failed: {e}")));
        }
    };
    if let Ok(mut h) = shared.history.lock() {
        h.push(generated.clone());
    }
    let inputs = match merge_generated(&shared.schema, &generated, &cfg.fixed_inputs, &cfg.disabled_inputs) {
        Ok(inputs) => inputs,
        Err(problems) => {
            let reason = format!("Generated inputs are invalid: {}", problems.join("; "));
            return finished(index, generated, CheckResult::inconclusive(reason));
        }
    };

    let fingerprint = inputs_fingerprint(&inputs);
    let repeated = shared.seen.lock().map(|mut seen| !seen.insert(fingerprint.clone())).unwrap_or(false);
    if repeated {
        tracing::debug!(iteration = index, %fingerprint, "generated inputs repeat an earlier iteration");
    }

    tracing::debug!(iteration = index, state = "predicting", "fuzz");
    let outcome = shared.predictor.predict(&shared.candidate, &inputs, shared.timeout).await;
    if outcome.is_fatal() {
        return Iteration {
            index,
            inputs,
            result: CheckResult::fail(outcome.error_message().unwrap_or_default()),
            fatal: outcome.error_message(),
        };
    }

    tracing::debug!(iteration = index, state = "checking", "fuzz");
    let result = match &outcome {
        PredictionOutcome::Success { output, .. } if is_empty_output(output) => CheckResult::fail("No output"),
        PredictionOutcome::Success { .. } => match &cfg.constraint {
            Some(checker) => checker.evaluate(&outcome, &shared.ctx).await,
            None => CheckResult::Pass,
        },
        failed => CheckResult::fail(format!(
            "Prediction raised unexpected error: {}",
            failed.error_message().unwrap_or_default()
        )),
    };
    finished(index, inputs, result)
}

fn finished(index: u32, inputs: Inputs, result: CheckResult) -> Iteration {
    tracing::debug!(iteration = index, state = "done", ?result, "fuzz");
    Iteration {
        index,
        inputs,
        result,
        fatal: None,
    }
}

fn is_empty_output(output: &Value) -> bool {
    match output {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}
