use async_trait::async_trait;
use safepush_core::{truncate, CheckResult, Checker, JudgeRequest, PredictionOutcome};
use serde_json::Value;

use crate::context::CheckContext;
use crate::judge::judge_best_of_three;
use crate::media::{extensions_match, output_url, output_urls};
use crate::query::{is_truthy, Query};

const PREVIEW_CHARS: usize = 200;

/// Judges a prediction outcome against a checker.
#[async_trait]
pub trait Evaluate {
    async fn evaluate(&self, outcome: &PredictionOutcome, ctx: &CheckContext) -> CheckResult;
}

#[async_trait]
impl Evaluate for Checker {
    async fn evaluate(&self, outcome: &PredictionOutcome, ctx: &CheckContext) -> CheckResult {
        let checked = match self {
            Checker::ErrorContains(needle) => Ok(check_error_contains(needle, outcome)),
            Checker::None => success_output(outcome).map(|_| CheckResult::Pass),
            Checker::ExactString(expected) => success_output(outcome).map(|o| check_exact_string(expected, o)),
            Checker::JsonQuery(query) => success_output(outcome).map(|o| check_json_query(query, o)),
            Checker::MatchUrl(expected) => match success_output(outcome) {
                Ok(o) => Ok(check_match_url(expected, o, ctx).await),
                Err(failed) => Err(failed),
            },
            Checker::MatchPrompt(prompt) => match success_output(outcome) {
                Ok(o) => Ok(check_match_prompt(prompt, o, ctx).await),
                Err(failed) => Err(failed),
            },
        };
        checked.unwrap_or_else(|failed| failed)
    }
}

/// Every checker but `ErrorContains` fails on a non-success outcome.
fn success_output(outcome: &PredictionOutcome) -> Result<&Value, CheckResult> {
    match outcome {
        PredictionOutcome::Success { output, .. } => Ok(output),
        other => Err(CheckResult::fail(format!(
            "Prediction raised unexpected error: {}",
            other.error_message().unwrap_or_default()
        ))),
    }
}

/// String outputs are used verbatim, anything else as compact JSON.
pub fn canonical_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_exact_string(expected: &str, output: &Value) -> CheckResult {
    let actual = canonical_output(output);
    if actual == expected {
        CheckResult::Pass
    } else {
        CheckResult::fail(format!(
            "Expected '{expected}', got '{}'",
            truncate(&actual, PREVIEW_CHARS)
        ))
    }
}

fn check_error_contains(needle: &str, outcome: &PredictionOutcome) -> CheckResult {
    match outcome.error_message() {
        None => CheckResult::fail("Expected error, prediction succeeded"),
        Some(message) if message.contains(needle) => CheckResult::Pass,
        Some(message) => CheckResult::fail(format!("Expected error to contain {needle}, got {message}")),
    }
}

async fn check_match_url(expected: &str, output: &Value, ctx: &CheckContext) -> CheckResult {
    let Some(actual) = output_url(output) else {
        return CheckResult::fail(format!(
            "Expected URL, got '{}'",
            truncate(&canonical_output(output), PREVIEW_CHARS)
        ));
    };
    if !extensions_match(expected, actual) {
        return CheckResult::fail(format!(
            "File at URL {expected} does not match file at URL {actual}. URL extensions don't match"
        ));
    }

    let attachments = match ctx.fetch_all(&[expected, actual]).await {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch media for url check");
            return CheckResult::inconclusive(format!("could not fetch media: {e}"));
        }
    };

    let request = JudgeRequest {
        instruction: "The first attached file is a reference and the second was produced by a model. \
                      Do the two files have equivalent content? Judge what they depict or contain, \
                      not encoding details."
            .into(),
        attachments,
    };
    match judge_best_of_three(ctx.oracle.as_ref(), request).await {
        Ok(j) if j.equivalent => {
            tracing::info!(expected, actual, "url content matched");
            CheckResult::Pass
        }
        Ok(j) => CheckResult::fail(format!(
            "File at URL {expected} does not match file at URL {actual}. {}",
            j.reasoning
        )),
        Err(e) => {
            tracing::warn!(error = %e, "oracle unavailable for url check");
            CheckResult::inconclusive(format!("AI error: {e}"))
        }
    }
}

async fn check_match_prompt(prompt: &str, output: &Value, ctx: &CheckContext) -> CheckResult {
    let urls = output_urls(output);
    let attachments = match ctx.fetch_all(&urls).await {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "could not fetch media for prompt check");
            return CheckResult::inconclusive(format!("could not fetch media: {e}"));
        }
    };

    let mut instruction = String::from(
        "You are part of an automatic evaluation that compares model outputs \
         (text, audio, image, video, etc.) to descriptions.\n\n",
    );
    if urls.is_empty() {
        instruction.push_str(&format!(
            "Does this output match the following description?\n\nOutput: {}\n\nDescription to evaluate: {prompt}",
            canonical_output(output)
        ));
    } else {
        instruction.push_str(&format!(
            "Do the attached file(s) match the description? \
             Use the file names and attached content.\n\nDescription to evaluate: {prompt}\n\nFilename(s): {}",
            urls.join(", ")
        ));
    }
    if let Some(reference) = &ctx.reference {
        instruction.push_str(&format!(
            "\n\nFor reference, the previously published version produced: {}",
            canonical_output(reference)
        ));
    }

    let request = JudgeRequest {
        instruction,
        attachments,
    };
    match judge_best_of_three(ctx.oracle.as_ref(), request).await {
        Ok(j) if j.equivalent => CheckResult::Pass,
        Ok(j) => CheckResult::fail(format!(
            "AI determined that the output does not match the description. {}",
            j.reasoning
        )),
        Err(e) => {
            tracing::warn!(error = %e, "oracle unavailable for prompt check");
            CheckResult::inconclusive(format!("AI error: {e}"))
        }
    }
}

fn check_json_query(source: &str, output: &Value) -> CheckResult {
    let query = match Query::parse(source) {
        Ok(q) => q,
        Err(e) => return CheckResult::fail(format!("invalid query {source}: {e}")),
    };
    let document = match output {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(_) => {
                return CheckResult::fail(format!(
                    "Output is not JSON: '{}'",
                    truncate(s, PREVIEW_CHARS)
                ))
            }
        },
        other => other.clone(),
    };
    let result = query.evaluate(&document);
    if is_truthy(&result) {
        CheckResult::Pass
    } else {
        CheckResult::fail(format!(
            "Query {query} evaluated to {result} on output '{}'",
            truncate(&document.to_string(), PREVIEW_CHARS)
        ))
    }
}
