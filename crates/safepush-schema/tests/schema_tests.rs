use safepush_core::Compatibility;
use safepush_schema::{compare, lint_descriptions, parse_openapi, violations};
use serde_json::{json, Value};

fn doc(inputs: Value, required: Value, output: Value) -> Value {
    json!({
        "openapi": "3.0.2",
        "components": { "schemas": {
            "Input": { "type": "object", "properties": inputs, "required": required },
            "Output": output,
            "scheduler": { "type": "string", "enum": ["ddim", "euler", "k_lms"] }
        }}
    })
}

fn base_doc() -> Value {
    doc(
        json!({
            "prompt": { "type": "string", "description": "Prompt", "x-order": 0 },
            "seed": { "type": "integer", "description": "Seed", "x-order": 1 },
            "steps": { "type": "integer", "minimum": 1, "maximum": 50, "default": 20, "description": "Steps", "x-order": 2 },
            "scheduler": { "allOf": [{ "$ref": "#/components/schemas/scheduler" }], "default": "ddim", "description": "Scheduler", "x-order": 3 }
        }),
        json!(["prompt"]),
        json!({ "type": "array", "items": { "type": "string", "format": "uri" } }),
    )
}

#[test]
fn test_identical_schemas_are_compatible() {
    let s = parse_openapi(&base_doc()).unwrap();
    assert_eq!(compare(&s, &s, false), Compatibility::Compatible);
    assert!(lint_descriptions(&s).is_empty());
}

#[test]
fn test_dropping_seed_blocks_push() {
    let current = parse_openapi(&base_doc()).unwrap();
    let mut candidate_doc = base_doc();
    candidate_doc["components"]["schemas"]["Input"]["properties"]
        .as_object_mut()
        .unwrap()
        .remove("seed");
    let candidate = parse_openapi(&candidate_doc).unwrap();

    let c = compare(&current, &candidate, false);
    assert!(c.blocks());
    assert_eq!(
        c,
        Compatibility::Incompatible {
            violations: vec!["Missing input seed".into()],
            ignored: false
        }
    );
}

#[test]
fn test_new_optional_input_is_compatible() {
    let current = parse_openapi(&base_doc()).unwrap();
    let mut candidate_doc = base_doc();
    candidate_doc["components"]["schemas"]["Input"]["properties"]["guidance"] =
        json!({ "type": "number", "default": 7.5, "description": "Guidance" });
    let candidate = parse_openapi(&candidate_doc).unwrap();
    assert_eq!(compare(&current, &candidate, false), Compatibility::Compatible);
}

#[test]
fn test_output_type_change() {
    let current = parse_openapi(&base_doc()).unwrap();
    let mut candidate_doc = base_doc();
    candidate_doc["components"]["schemas"]["Output"] = json!({ "type": "string", "format": "uri" });
    let candidate = parse_openapi(&candidate_doc).unwrap();
    assert_eq!(
        violations(&current, &candidate),
        vec!["Output has changed type from array to string".to_string()]
    );
}

#[test]
fn test_removed_choice() {
    let current = parse_openapi(&base_doc()).unwrap();
    let mut candidate_doc = base_doc();
    candidate_doc["components"]["schemas"]["scheduler"]["enum"] = json!(["ddim", "euler"]);
    let candidate = parse_openapi(&candidate_doc).unwrap();
    assert_eq!(
        violations(&current, &candidate),
        vec!["Input scheduler is missing choices: 'k_lms'".to_string()]
    );
}

#[test]
fn test_violation_order_is_stable() {
    let current = parse_openapi(&base_doc()).unwrap();
    let candidate = parse_openapi(&doc(
        json!({
            "prompt": { "type": "integer", "description": "Prompt" },
            "mask": { "type": "string", "description": "Mask" }
        }),
        json!(["prompt", "mask"]),
        json!({ "type": "array", "items": { "type": "string", "format": "uri" } }),
    ))
    .unwrap();
    let first = violations(&current, &candidate);
    assert_eq!(first, violations(&current, &candidate));
    assert_eq!(
        first,
        vec![
            "Input prompt has changed type from string to integer".to_string(),
            "Missing input seed".to_string(),
            "Missing input steps".to_string(),
            "Missing input scheduler".to_string(),
            "Input mask is new and is required".to_string(),
        ]
    );
}
