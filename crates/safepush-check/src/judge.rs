use safepush_core::{Judgement, JudgeRequest, Oracle, OracleError};

/// Asks the oracle, and on a negative answer asks twice more; positive if two
/// of the three answers are. The returned reasoning is the first negative one
/// when the overall answer is negative. An oracle error while re-asking
/// settles on the answers already collected.
pub async fn judge_best_of_three(oracle: &dyn Oracle, request: JudgeRequest) -> Result<Judgement, OracleError> {
    let first = oracle.judge(request.clone()).await?;
    if first.equivalent {
        return Ok(first);
    }

    let mut positives = 0;
    for attempt in 2..=3 {
        let again = match oracle.judge(request.clone()).await {
            Ok(again) => again,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "oracle failed while re-judging, keeping the negative answer");
                return Ok(first);
            }
        };
        tracing::debug!(attempt, equivalent = again.equivalent, "oracle re-judged negative answer");
        if again.equivalent {
            positives += 1;
            if positives >= 2 {
                return Ok(again);
            }
        } else {
            // A second negative settles it.
            return Ok(first);
        }
    }
    Ok(first)
}
