//! Extraction prompts built from form schemas.
//!
//! The schema's field list is the extraction target: the model is told
//! exactly which keys to fill and must return null for anything it cannot
//! see. Prompts are deterministic for a given schema so identical inputs
//! produce identical requests.

use crate::schema::{FormSchema, ValueKind};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are extracting fields from a US tax document. Your ONLY role is to read \
values that are explicitly present on the form. Do not hallucinate. Do not \
compute, infer, or summarize. If a box is blank, unreadable, or absent, its \
value is null. Return JSON only, with no commentary.";

/// Per-kind formatting instruction appended to each field line.
fn kind_hint(kind: &ValueKind, choices: &[String]) -> String {
    match kind {
        ValueKind::Money => "dollar amount as a string, digits and optional commas, no $".to_string(),
        ValueKind::Text => "string exactly as printed (TIN/SSN may be masked; preserve as seen)".to_string(),
        ValueKind::Date => "date as printed, e.g. 2025-04-15 or 04/15/2025".to_string(),
        ValueKind::Boolean => "true if the box is checked, false if not, null if not visible".to_string(),
        ValueKind::Enum => format!("one of: {}", choices.join(", ")),
    }
}

/// Build the JSON-only extraction prompt for one form schema.
pub fn build_extraction_prompt(schema: &FormSchema) -> String {
    let mut field_lines = String::new();
    for field in &schema.fields {
        field_lines.push_str(&format!(
            "  \"{}\": {{\"value\": ..., \"confidence\": ...}},  // {}: {}\n",
            field.key,
            field.label,
            kind_hint(&field.kind, &field.choices)
        ));
    }

    format!(
        r#"The document is US IRS Form {form} for tax year {year}.
Extract the fields below. Return a single JSON object with exactly these keys
and no others. For each key return {{"value": <string or null>, "confidence": <0 to 1>}}.
Use null for any box that is blank, unreadable, or not on this page.

{{
{fields}}}
"#,
        form = schema.form_type,
        year = schema.tax_year,
        fields = field_lines,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::schema::FormType;

    #[test]
    fn prompt_lists_every_schema_key() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.schema_for(FormType::Div1099, 2025).unwrap();
        let prompt = build_extraction_prompt(&schema);
        for key in schema.keys() {
            assert!(prompt.contains(&format!("\"{key}\"")), "missing {key}");
        }
        assert!(prompt.contains("1099-DIV"));
        assert!(prompt.contains("2025"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.schema_for(FormType::W2, 2024).unwrap();
        assert_eq!(build_extraction_prompt(&schema), build_extraction_prompt(&schema));
    }

    #[test]
    fn enum_fields_list_their_choices() {
        let registry = SchemaRegistry::with_builtin();
        let schema = registry.schema_for(FormType::F1040, 2025).unwrap();
        let prompt = build_extraction_prompt(&schema);
        assert!(prompt.contains("married_filing_jointly"));
    }
}
