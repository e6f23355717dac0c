use safepush_core::{
    CaseReport, CheckResult, Checker, Compatibility, FuzzConfig, Inputs, LintReport, PredictionOutcome,
    RemoteStatus, Verdict,
};
use serde_json::json;

#[test]
fn test_remote_status_serde() {
    let s = serde_json::to_string(&RemoteStatus::Succeeded).unwrap();
    assert_eq!(s, r#""succeeded""#);
    let back: RemoteStatus = serde_json::from_str(r#""processing""#).unwrap();
    assert_eq!(back, RemoteStatus::Processing);
    assert!(!back.is_terminal());
    assert!(RemoteStatus::Canceled.is_terminal());
}

#[test]
fn test_prediction_outcome_serde() {
    let o = PredictionOutcome::Success {
        output: json!("hi"),
        latency_ms: 12,
    };
    let v = serde_json::to_value(&o).unwrap();
    assert_eq!(v["status"], "success");
    assert_eq!(v["latency_ms"], 12);
    let back: PredictionOutcome = serde_json::from_value(v).unwrap();
    assert_eq!(back, o);
}

#[test]
fn test_fuzz_config_defaults_from_yaml_like_json() {
    let cfg: FuzzConfig = serde_json::from_value(json!({ "iterations": 5 })).unwrap();
    assert_eq!(cfg.iterations, Some(5));
    assert_eq!(cfg.duration, 300);
    assert!(cfg.fixed_inputs.is_empty());
    assert!(cfg.constraint.is_none());
}

#[test]
fn test_fuzz_constraint_hook_parses() {
    let cfg: FuzzConfig =
        serde_json::from_value(json!({ "constraint": { "kind": "json_query", "value": ".ok" } })).unwrap();
    assert_eq!(cfg.constraint, Some(Checker::JsonQuery(".ok".into())));
}

#[test]
fn test_ignored_incompatibility_does_not_block() {
    let c = Compatibility::Incompatible {
        violations: vec!["Missing input seed".into()],
        ignored: true,
    };
    assert!(!c.blocks());
    let c = Compatibility::Incompatible {
        violations: vec!["Missing input seed".into()],
        ignored: false,
    };
    assert!(c.blocks());
    assert!(!Compatibility::NotApplicable.blocks());
}

#[test]
fn test_verdict_lists_inconclusive_cases() {
    let case = |index: usize, result: CheckResult| CaseReport {
        index,
        label: format!("case {index}"),
        inputs: Inputs::new(),
        result,
    };
    let verdict = Verdict {
        run_id: "r".into(),
        started_ms: 0,
        lint: LintReport::default(),
        compatibility: Compatibility::Compatible,
        test_cases: vec![case(0, CheckResult::Pass), case(1, CheckResult::inconclusive("oracle down"))],
        comparison: Some(case(0, CheckResult::inconclusive("oracle down"))),
        fuzz: None,
        incomplete: false,
        push: true,
        blocking_reason: None,
    };
    assert_eq!(verdict.inconclusive().len(), 2);
    assert_eq!(verdict.to_json().unwrap()["compatibility"]["status"], "compatible");
}
