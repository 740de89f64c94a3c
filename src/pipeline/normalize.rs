//! Raw string → typed value normalization.
//!
//! Malformed model output is the expected common case, not an exceptional
//! one: every function here returns a `Result` the extractor converts into
//! an absent, zero-confidence field rather than aborting the segment.

use chrono::NaiveDate;
use thiserror::Error;

use crate::money::{Money, MoneyParseError};
use crate::record::FieldValue;
use crate::schema::{FieldDefinition, ValueKind};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error(transparent)]
    Money(#[from] MoneyParseError),

    #[error("unparseable date: {0:?}")]
    Date(String),

    #[error("unparseable boolean: {0:?}")]
    Boolean(String),

    #[error("{value:?} is not one of the permitted choices")]
    Choice { value: String },

    #[error("empty value")]
    Empty,
}

/// Normalize a raw extracted string under a field definition.
pub fn normalize_value(def: &FieldDefinition, raw: &str) -> Result<FieldValue, NormalizeError> {
    normalize_kind(def.kind, &def.choices, raw)
}

/// Kind-level normalization; `choices` only matters for `ValueKind::Enum`.
pub fn normalize_kind(
    kind: ValueKind,
    choices: &[String],
    raw: &str,
) -> Result<FieldValue, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }
    match kind {
        ValueKind::Money => Ok(FieldValue::Money(Money::parse(trimmed)?)),
        ValueKind::Text => Ok(FieldValue::Text(trimmed.to_string())),
        ValueKind::Date => parse_date(trimmed).map(FieldValue::Date),
        ValueKind::Boolean => parse_boolean(trimmed).map(FieldValue::Bool),
        ValueKind::Enum => match_choice(choices, trimmed).map(FieldValue::Enum),
    }
}

/// Parse a date as printed on US tax forms.
/// Supports ISO 8601, MM/DD/YYYY, MM-DD-YYYY, and MM/DD/YY.
fn parse_date(raw: &str) -> Result<NaiveDate, NormalizeError> {
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    Err(NormalizeError::Date(raw.to_string()))
}

/// Checkbox marks and boolean words.
fn parse_boolean(raw: &str) -> Result<bool, NormalizeError> {
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "y" | "x" | "checked" | "1" => Ok(true),
        "false" | "no" | "n" | "unchecked" | "0" => Ok(false),
        _ => Err(NormalizeError::Boolean(raw.to_string())),
    }
}

/// Case-insensitive choice matching; spaces and underscores are equivalent.
/// Returns the canonical choice string from the schema.
fn match_choice(choices: &[String], raw: &str) -> Result<String, NormalizeError> {
    let canon = |s: &str| s.to_lowercase().replace(' ', "_");
    let needle = canon(raw);
    choices
        .iter()
        .find(|c| canon(c) == needle)
        .cloned()
        .ok_or(NormalizeError::Choice {
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money_def() -> FieldDefinition {
        FieldDefinition::new("amount", "Amount", ValueKind::Money, true)
    }

    #[test]
    fn money_with_commas_and_symbol() {
        let value = normalize_value(&money_def(), "$1,234.56").unwrap();
        assert_eq!(value.render(), "1234.56");
    }

    #[test]
    fn malformed_money_fails() {
        assert!(normalize_value(&money_def(), "about twelve dollars").is_err());
        assert!(normalize_value(&money_def(), "").is_err());
    }

    #[test]
    fn date_formats() {
        let def = FieldDefinition::new("d", "Date", ValueKind::Date, false);
        for raw in ["2025-04-15", "04/15/2025", "04-15-2025"] {
            assert_eq!(normalize_value(&def, raw).unwrap().render(), "2025-04-15");
        }
        assert!(normalize_value(&def, "April the fifteenth").is_err());
    }

    #[test]
    fn two_digit_year() {
        let def = FieldDefinition::new("d", "Date", ValueKind::Date, false);
        assert_eq!(normalize_value(&def, "04/15/25").unwrap().render(), "2025-04-15");
    }

    #[test]
    fn checkbox_booleans() {
        let def = FieldDefinition::new("b", "Box", ValueKind::Boolean, false);
        assert_eq!(normalize_value(&def, "X").unwrap(), FieldValue::Bool(true));
        assert_eq!(normalize_value(&def, "true").unwrap(), FieldValue::Bool(true));
        assert_eq!(normalize_value(&def, "no").unwrap(), FieldValue::Bool(false));
        assert!(normalize_value(&def, "maybe").is_err());
    }

    #[test]
    fn enum_matching_is_case_and_separator_insensitive() {
        let def = FieldDefinition::enumerated(
            "status",
            "Filing status",
            true,
            &["single", "married_filing_jointly"],
        );
        assert_eq!(
            normalize_value(&def, "Married Filing Jointly").unwrap(),
            FieldValue::Enum("married_filing_jointly".into())
        );
        assert!(normalize_value(&def, "divorced").is_err());
    }

    #[test]
    fn text_is_trimmed() {
        let def = FieldDefinition::new("name", "Name", ValueKind::Text, true);
        assert_eq!(
            normalize_value(&def, "  Acme Corp  ").unwrap(),
            FieldValue::Text("Acme Corp".into())
        );
    }

    #[test]
    fn canonical_renderings_renormalize() {
        // Persistence stores render() output and re-normalizes on load;
        // every canonical form must parse back to itself.
        let cases: Vec<(FieldDefinition, &str)> = vec![
            (money_def(), "1234.56"),
            (FieldDefinition::new("d", "D", ValueKind::Date, false), "2025-04-15"),
            (FieldDefinition::new("b", "B", ValueKind::Boolean, false), "true"),
            (FieldDefinition::enumerated("e", "E", false, &["general"]), "general"),
        ];
        for (def, canonical) in cases {
            let value = normalize_value(&def, canonical).unwrap();
            assert_eq!(value.render(), canonical);
        }
    }
}
