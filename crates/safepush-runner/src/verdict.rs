use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use safepush_core::{now_ms, truncate, CaseReport, CheckResult, Compatibility, FuzzSummary, LintReport, Verdict};

/// Everything a campaign gathered, before the push decision.
#[derive(Clone, Debug)]
pub struct Findings {
    pub run_id: String,
    pub started_ms: i64,
    pub lint: LintReport,
    pub compatibility: Compatibility,
    pub test_cases: Vec<CaseReport>,
    pub comparison: Option<CaseReport>,
    pub fuzz: Option<FuzzSummary>,
    pub interrupted: bool,
}

impl Findings {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_ms: now_ms(),
            lint: LintReport::default(),
            compatibility: Compatibility::NotApplicable,
            test_cases: vec![],
            comparison: None,
            fuzz: None,
            interrupted: false,
        }
    }
}

/// Push iff nothing blocks. The first blocking reason wins, checked in the
/// order lint, schema, test cases, comparison, fuzz, interruption.
pub fn aggregate(f: Findings) -> Verdict {
    let blocking_reason = blocking_reason(&f);
    Verdict {
        run_id: f.run_id,
        started_ms: f.started_ms,
        lint: f.lint,
        compatibility: f.compatibility,
        test_cases: f.test_cases,
        comparison: f.comparison,
        fuzz: f.fuzz,
        incomplete: f.interrupted,
        push: blocking_reason.is_none(),
        blocking_reason,
    }
}

fn blocking_reason(f: &Findings) -> Option<String> {
    if let Some(first) = f.lint.findings().next() {
        let more = f.lint.findings().count() - 1;
        return Some(match more {
            0 => format!("lint failed: {first}"),
            n => format!("lint failed: {first} (and {n} more)"),
        });
    }
    if let Compatibility::Incompatible { violations, ignored: false } = &f.compatibility {
        return Some(format!("schema is incompatible: {}", violations.join("; ")));
    }
    if let Some(case) = f.test_cases.iter().find(|c| c.result.is_fail()) {
        return Some(format!("{} failed: {}", case.label, case.result.reason().unwrap_or_default()));
    }
    if let Some(CaseReport {
        result: CheckResult::Fail { reason },
        ..
    }) = &f.comparison
    {
        return Some(format!("outputs differ from the current version: {reason}"));
    }
    if let Some(fuzz) = f.fuzz.as_ref().filter(|z| z.failures > 0) {
        let first = fuzz.samples.first().map(|s| s.reason.as_str()).unwrap_or_default();
        return Some(format!(
            "fuzzing found {} failure(s) in {} iteration(s): {first}",
            fuzz.failures, fuzz.iterations
        ));
    }
    if f.interrupted {
        return Some("run was interrupted before every stage finished".into());
    }
    None
}

/// Human-readable report for the terminal.
pub fn render_summary(v: &Verdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run {}", v.run_id);

    if v.lint.passed() {
        let _ = writeln!(out, "lint: ok");
    } else {
        let _ = writeln!(out, "lint: {} finding(s)", v.lint.findings().count());
        for finding in v.lint.findings() {
            let _ = writeln!(out, "  - {finding}");
        }
    }

    match &v.compatibility {
        Compatibility::NotApplicable => {
            let _ = writeln!(out, "schema: no current version to compare");
        }
        Compatibility::Compatible => {
            let _ = writeln!(out, "schema: compatible");
        }
        Compatibility::Incompatible { violations, ignored } => {
            let suffix = if *ignored { " (ignored)" } else { "" };
            let _ = writeln!(out, "schema: incompatible{suffix}");
            for violation in violations {
                let _ = writeln!(out, "  - {violation}");
            }
        }
    }

    if !v.test_cases.is_empty() {
        let passed = v.test_cases.iter().filter(|c| c.result.is_pass()).count();
        let _ = writeln!(out, "test cases: {passed}/{} passed", v.test_cases.len());
        for case in v.test_cases.iter().filter(|c| c.result.is_fail()) {
            let _ = writeln!(out, "  FAIL {}: {}", case.label, case.result.reason().unwrap_or_default());
        }
    }
    if let Some(c) = &v.comparison {
        let status = match &c.result {
            CheckResult::Pass => "match".to_string(),
            CheckResult::Fail { reason } => format!("MISMATCH: {reason}"),
            CheckResult::Inconclusive { reason } => format!("inconclusive: {reason}"),
        };
        let _ = writeln!(out, "{}: {status}", c.label);
    }

    let unsure = v.inconclusive();
    if !unsure.is_empty() {
        let _ = writeln!(out, "inconclusive, check by hand:");
        for case in unsure {
            let _ = writeln!(out, "  ? {}: {}", case.label, case.result.reason().unwrap_or_default());
        }
    }

    if let Some(fuzz) = &v.fuzz {
        let _ = writeln!(
            out,
            "fuzz: {} iteration(s), {} failure(s), {} inconclusive in {:.1}s{}",
            fuzz.iterations,
            fuzz.failures,
            fuzz.inconclusive,
            fuzz.elapsed_ms as f64 / 1000.0,
            if fuzz.interrupted { " (interrupted)" } else { "" }
        );
        for sample in &fuzz.samples {
            let inputs = serde_json::to_string(&sample.inputs).unwrap_or_default();
            let _ = writeln!(out, "  #{} {}: {}", sample.iteration, truncate(&inputs, 200), sample.reason);
        }
    }

    if v.incomplete {
        let _ = writeln!(out, "run incomplete");
    }
    match &v.blocking_reason {
        None => {
            let _ = writeln!(out, "verdict: PUSH");
        }
        Some(reason) => {
            let _ = writeln!(out, "verdict: DO NOT PUSH ({reason})");
        }
    }
    out
}

/// Writes the JSON report; `~` in `path` is expanded.
pub fn write_report(v: &Verdict, path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(shellexpand::tilde(path).as_ref());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let report = v.to_json().with_context(|| "serialize report")?;
    let s = serde_json::to_string_pretty(&report).with_context(|| "serialize report")?;
    std::fs::write(&path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
