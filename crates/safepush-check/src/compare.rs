use safepush_core::{preview, CheckResult, Inputs, JudgeRequest};
use serde_json::Value;

use crate::context::CheckContext;
use crate::judge::judge_best_of_three;
use crate::media::{extensions_match, is_image, is_url};
use crate::pixels::{compare_images, ImageComparison};

const FLOAT_TOLERANCE: f64 = 0.1;

/// Inputs carrying a `seed` are expected to reproduce the same output.
pub fn is_deterministic(inputs: &Inputs) -> bool {
    inputs.contains_key("seed")
}

/// A leaf pair that only the oracle can settle.
#[derive(Debug, PartialEq)]
enum Deferred<'a> {
    Strings { at: String, candidate: &'a str, current: &'a str },
    Images { at: String, candidate: &'a str, current: &'a str },
}

/// Compares the candidate version's output with the current version's output
/// for the same inputs.
///
/// The structure is compared first; oracle judgements are only requested once
/// the shapes agree, one leaf at a time.
pub async fn compare_outputs(candidate: &Value, current: &Value, inputs: &Inputs, ctx: &CheckContext) -> CheckResult {
    let deterministic = is_deterministic(inputs);
    let mut deferred = Vec::new();
    if let Err(reason) = structural_match(candidate, current, deterministic, "", &mut deferred) {
        return CheckResult::fail(reason);
    }

    let shared_inputs = serde_json::to_string(inputs).unwrap_or_default();
    for pending in deferred {
        let (at, request, mismatch) = match pending {
            Deferred::Strings { at, candidate, current } => (
                at,
                JudgeRequest {
                    instruction: format!(
                        "Have these two strings been generated by the same generative AI model inputs/prompt?\n\n\
                         Inputs: {shared_inputs}\n\nString 1: '{current}'\nString 2: '{candidate}'"
                    ),
                    attachments: vec![],
                },
                "Strings aren't similar",
            ),
            Deferred::Images { at, candidate, current } => {
                let attachments = match ctx.fetch_all(&[current, candidate]).await {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not fetch outputs for comparison");
                        return CheckResult::inconclusive(format!("{at}could not fetch media: {e}"));
                    }
                };
                if let [current_image, candidate_image] = attachments.as_slice() {
                    match compare_images(&current_image.bytes, &candidate_image.bytes, deterministic) {
                        ImageComparison::SizeMismatch => return CheckResult::fail(format!("{at}Image sizes don't match")),
                        ImageComparison::NotIdentical { .. } => {
                            return CheckResult::fail(format!("{at}Images are not identical"))
                        }
                        ImageComparison::Identical => continue,
                        ImageComparison::Undecided => {}
                    }
                }
                (
                    at,
                    JudgeRequest {
                        instruction: format!(
                            "These two images have been generated by or modified by an AI model with these inputs: \
                             {shared_inputs}. Is it highly likely that those two predictions of the model had the same inputs?"
                        ),
                        attachments,
                    },
                    "Images are not similar",
                )
            }
        };

        match judge_best_of_three(ctx.oracle.as_ref(), request).await {
            Ok(j) if j.equivalent => {}
            Ok(j) => return CheckResult::fail(format!("{at}{mismatch}. {}", j.reasoning).trim_end().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "oracle unavailable for output comparison");
                return CheckResult::inconclusive(format!("{at}AI error: {e}"));
            }
        }
    }
    CheckResult::Pass
}

/// Walks both values in lockstep. `at` is the message prefix for the current
/// position, e.g. `In images: At index 2: `.
fn structural_match<'a>(
    candidate: &'a Value,
    current: &'a Value,
    deterministic: bool,
    at: &str,
    deferred: &mut Vec<Deferred<'a>>,
) -> Result<(), String> {
    match (candidate, current) {
        (Value::Null, Value::Null) => Ok(()),
        (Value::Bool(a), Value::Bool(b)) => {
            if a == b {
                Ok(())
            } else {
                Err(format!("{at}Booleans aren't identical"))
            }
        }
        (Value::Number(a), Value::Number(b)) if a.is_f64() == b.is_f64() => {
            let equal = if a.is_f64() {
                match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => (x - y).abs() < FLOAT_TOLERANCE,
                    _ => false,
                }
            } else {
                a == b
            };
            if equal {
                Ok(())
            } else if a.is_f64() {
                Err(format!("{at}Floats aren't identical"))
            } else {
                Err(format!("{at}Integers aren't identical"))
            }
        }
        (Value::String(a), Value::String(b)) => match (is_url(a), is_url(b)) {
            (true, true) => {
                if !extensions_match(a, b) {
                    return Err(format!("{at}URL extensions don't match"));
                }
                if is_image(b) {
                    deferred.push(Deferred::Images {
                        at: at.to_string(),
                        candidate: a,
                        current: b,
                    });
                } else {
                    tracing::debug!(url = %b, "no content comparison for this media type");
                }
                Ok(())
            }
            (false, false) if deterministic => {
                if a == b {
                    Ok(())
                } else {
                    Err(format!("{at}Strings aren't the same"))
                }
            }
            (false, false) => {
                if a != b {
                    deferred.push(Deferred::Strings {
                        at: at.to_string(),
                        candidate: a,
                        current: b,
                    });
                }
                Ok(())
            }
            _ => Err(format!("{at}Only one output is a URL")),
        },
        (Value::Object(a), Value::Object(b)) => {
            if a.len() != b.len() || a.keys().any(|k| !b.contains_key(k)) {
                return Err(format!("{at}Dict keys don't match"));
            }
            for (key, value) in a {
                if let Some(other) = b.get(key) {
                    structural_match(value, other, deterministic, &format!("{at}In {key}: "), deferred)?;
                }
            }
            Ok(())
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Err(format!("{at}List lengths don't match"));
            }
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                structural_match(x, y, deterministic, &format!("{at}At index {i}: "), deferred)?;
            }
            Ok(())
        }
        _ => Err(format!(
            "{at}The types of the outputs don't match ({} vs {})",
            preview(current, 50),
            preview(candidate, 50)
        )),
    }
}
