use safepush_core::Schema;

/// One finding per input without a non-empty description.
pub fn lint_descriptions(schema: &Schema) -> Vec<String> {
    schema
        .inputs
        .iter()
        .filter(|p| p.description.as_deref().map_or(true, |d| d.trim().is_empty()))
        .map(|p| format!("{}: Missing description", p.name))
        .collect()
}
