//! Model response parsing.
//!
//! Models wrap JSON in code fences, add commentary, and occasionally return
//! numbers where strings were asked for. Parsing is lenient about all of
//! that but strict about the schema boundary: keys not in the schema are
//! dropped, so a backend can never invent fields.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{BackendError, RawFieldReading};
use crate::schema::FormSchema;

/// Best-effort strip of markdown code fences around a JSON body.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening fence line.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireReading {
    /// The requested shape: {"value": ..., "confidence": ...}
    Scored {
        value: Option<serde_json::Value>,
        confidence: Option<f32>,
    },
    /// Bare value with no confidence envelope.
    Bare(Option<serde_json::Value>),
}

/// Render a JSON value as the raw field string. Objects and arrays are not
/// field values and read as "not found".
fn value_to_raw(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            let s = s.trim().to_string();
            if s.is_empty() { None } else { Some(s) }
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

/// Parse a model response into per-key readings, filtered to the schema.
///
/// Unreported confidence is not trusted: it becomes 0.0 and the field lands
/// in the review queue rather than being silently accepted.
pub fn parse_field_response(
    text: &str,
    schema: &FormSchema,
) -> Result<BTreeMap<String, RawFieldReading>, BackendError> {
    let body = strip_code_fences(text);
    let wire: BTreeMap<String, WireReading> = serde_json::from_str(body)
        .map_err(|e| BackendError::ResponseParsing(e.to_string()))?;

    let mut readings = BTreeMap::new();
    for (key, reading) in wire {
        if schema.field(&key).is_none() {
            tracing::debug!(key, "dropping field outside schema");
            continue;
        }
        let (value, confidence) = match reading {
            WireReading::Scored { value, confidence } => (value, confidence.unwrap_or(0.0)),
            WireReading::Bare(value) => (value, 0.0),
        };
        readings.insert(
            key,
            RawFieldReading {
                raw_value: value.and_then(value_to_raw),
                confidence: confidence.clamp(0.0, 1.0),
            },
        );
    }
    Ok(readings)
}
