//! Parsing of the compact `k=v;k2=v2` notation used on the command line.

use safepush_core::Inputs;
use safepush_runner::TestCaseConfig;
use serde_json::Value;

/// Checker separators between a test case's inputs and its expectation.
const SEPARATORS: [&str; 5] = ["==", "~=", "^=", "?=", "!="];

/// `true`/`false` (any case), then integer, then float, then string.
pub fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

/// `k=v;k2=v2` into inputs. Empty segments are skipped.
pub fn parse_inputs(raw: &str) -> Result<Inputs, String> {
    let mut inputs = Inputs::new();
    for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid input {pair:?}, expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("invalid input {pair:?}, empty key"));
        }
        inputs.insert(key.to_string(), parse_value(value));
    }
    Ok(inputs)
}

/// `k=v;k2=2==expected`. The left-most separator in the value of the last
/// `key=value` segment splits inputs from the expectation: `==` exact string,
/// `~=` prompt, `^=` URL, `?=` query, `!=` error substring. Separators inside
/// earlier values are kept. Without a separator the case only has to succeed.
pub fn parse_test_case(raw: &str) -> Result<TestCaseConfig, String> {
    let from = last_value_start(raw).unwrap_or(0);
    let split = SEPARATORS
        .iter()
        .filter_map(|sep| raw[from..].find(sep).map(|at| (from + at, *sep)))
        .min_by_key(|(at, _)| *at);

    let Some((at, sep)) = split else {
        return Ok(TestCaseConfig {
            inputs: parse_inputs(raw)?,
            ..Default::default()
        });
    };

    let expected = raw[at + sep.len()..].trim().to_string();
    let mut case = TestCaseConfig {
        inputs: parse_inputs(&raw[..at])?,
        ..Default::default()
    };
    match sep {
        "==" => case.exact_string = Some(expected),
        "~=" => case.match_prompt = Some(expected),
        "^=" => case.match_url = Some(expected),
        "?=" => case.jq_query = Some(expected),
        _ => case.error_contains = Some(expected),
    }
    Ok(case)
}

/// Byte offset of the value of the last segment that starts with `key=`.
fn last_value_start(raw: &str) -> Option<usize> {
    std::iter::once(0)
        .chain(raw.match_indices(';').map(|(i, _)| i + 1))
        .filter_map(|segment| value_start(raw, segment))
        .last()
}

fn value_start(raw: &str, segment: usize) -> Option<usize> {
    let rest = &raw[segment..];
    let trimmed = rest.trim_start();
    let eq = trimmed.find('=')?;
    is_identifier(trimmed[..eq].trim_end()).then(|| segment + (rest.len() - trimmed.len()) + eq + 1)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_prefer_bool_then_int_then_float() {
        assert_eq!(parse_value("TRUE"), json!(true));
        assert_eq!(parse_value("false"), json!(false));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("-3"), json!(-3));
        assert_eq!(parse_value("0.5"), json!(0.5));
        assert_eq!(parse_value(" a cat "), json!("a cat"));
        assert_eq!(parse_value("nan"), json!("nan"));
    }

    #[test]
    fn inputs_split_on_semicolons() {
        let inputs = parse_inputs("prompt=a cat; steps=20;;guidance=7.5").unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs["prompt"], json!("a cat"));
        assert_eq!(inputs["steps"], json!(20));
        assert_eq!(inputs["guidance"], json!(7.5));
        assert!(parse_inputs("novalue").is_err());
        assert!(parse_inputs("=1").is_err());
    }

    #[test]
    fn test_case_separators() {
        let c = parse_test_case("prompt=hi;seed=1==hi there").unwrap();
        assert_eq!(c.inputs["seed"], json!(1));
        assert_eq!(c.exact_string.as_deref(), Some("hi there"));

        let c = parse_test_case("prompt=a cat~=an image of a cat").unwrap();
        assert_eq!(c.match_prompt.as_deref(), Some("an image of a cat"));

        let c = parse_test_case("prompt=x^=https://example.com/out.png").unwrap();
        assert_eq!(c.match_url.as_deref(), Some("https://example.com/out.png"));

        let c = parse_test_case("prompt=x?=.count == 3").unwrap();
        assert_eq!(c.jq_query.as_deref(), Some(".count == 3"));

        let c = parse_test_case("steps=-1!=must be positive").unwrap();
        assert_eq!(c.error_contains.as_deref(), Some("must be positive"));
        assert_eq!(c.inputs["steps"], json!(-1));

        let c = parse_test_case("prompt=hello").unwrap();
        assert_eq!(c.to_test_case(1).unwrap().checker, safepush_core::Checker::None);
    }

    #[test]
    fn separators_in_earlier_values_are_kept() {
        let c = parse_test_case("filter=a==b;prompt=hi==hi").unwrap();
        assert_eq!(c.inputs["filter"], json!("a==b"));
        assert_eq!(c.inputs["prompt"], json!("hi"));
        assert_eq!(c.exact_string.as_deref(), Some("hi"));

        let c = parse_test_case("expr=x!=y;steps=3").unwrap();
        assert_eq!(c.inputs["expr"], json!("x!=y"));
        assert_eq!(c.error_contains, None);

        let c = parse_test_case("prompt=hi==a; b").unwrap();
        assert_eq!(c.exact_string.as_deref(), Some("a; b"));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("seed"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }
}
