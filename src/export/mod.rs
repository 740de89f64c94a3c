//! Export formatting.
//!
//! Exports are pure reads: the same set of records always renders the same
//! bytes, and rendering never touches review state. Marking records exported
//! is a separate store operation the CLI performs after the bytes are
//! written.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::record::{DocumentRecord, ExtractedField, FieldValue};
use crate::schema::SchemaRegistry;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One row per record, one column per field key.
    WideCsv,
    /// One row per field.
    LongCsv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wide" | "wide-csv" | "csv" => Ok(Self::WideCsv),
            "long" | "long-csv" => Ok(Self::LongCsv),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown export format {other:?} (expected wide, long, or json)"
            )),
        }
    }
}

/// Render the records in the requested format.
///
/// Records are ordered by id before rendering so output bytes do not depend
/// on the order the caller collected them in.
pub fn export(
    records: &[DocumentRecord],
    registry: &SchemaRegistry,
    format: ExportFormat,
) -> Result<Vec<u8>, ExportError> {
    let mut ordered: Vec<&DocumentRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.id);

    match format {
        ExportFormat::WideCsv => wide_csv(&ordered, registry),
        ExportFormat::LongCsv => long_csv(&ordered),
        ExportFormat::Json => json_export(&ordered),
    }
}

const IDENTITY_COLUMNS: [&str; 4] = ["document_id", "filer", "tax_year", "form_type"];

/// Field-key columns for the wide layout: keys grouped by the registry's
/// form order, within a form in schema (record) order, deduplicated by first
/// appearance. Forms the registry does not know contribute their keys last.
fn wide_columns(records: &[&DocumentRecord], registry: &SchemaRegistry) -> Vec<String> {
    let mut columns = Vec::new();
    let mut seen = BTreeSet::new();
    let mut push_keys = |record: &DocumentRecord, columns: &mut Vec<String>| {
        for field in &record.fields {
            if seen.insert(field.key.clone()) {
                columns.push(field.key.clone());
            }
        }
    };

    let supported = registry.supported_forms();
    for form in &supported {
        for record in records.iter().filter(|r| r.form_type == *form) {
            push_keys(record, &mut columns);
        }
    }
    for record in records
        .iter()
        .filter(|r| !supported.contains(&r.form_type))
    {
        push_keys(record, &mut columns);
    }
    columns
}

fn cell(field: Option<&ExtractedField>) -> String {
    field
        .and_then(|f| f.normalized.as_ref())
        .map(FieldValue::render)
        .unwrap_or_default()
}

fn wide_csv(records: &[&DocumentRecord], registry: &SchemaRegistry) -> Result<Vec<u8>, ExportError> {
    let columns = wide_columns(records, registry);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = IDENTITY_COLUMNS.to_vec();
    header.extend(columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.id.to_string(),
            record.filer.clone().unwrap_or_default(),
            record.tax_year.to_string(),
            record.form_type.as_str().to_string(),
        ];
        for key in &columns {
            row.push(cell(record.field(key)));
        }
        writer.write_record(&row)?;
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

fn long_csv(records: &[&DocumentRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "document_id",
        "filer",
        "tax_year",
        "form_type",
        "field_key",
        "value",
        "confidence",
        "source",
    ])?;

    for record in records {
        for field in &record.fields {
            writer.write_record([
                record.id.to_string(),
                record.filer.clone().unwrap_or_default(),
                record.tax_year.to_string(),
                record.form_type.as_str().to_string(),
                field.key.clone(),
                cell(Some(field)),
                format!("{:.2}", field.confidence),
                field.source.as_str().to_string(),
            ])?;
        }
    }

    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

fn json_export(records: &[&DocumentRecord]) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let mut fields = Map::new();
        for field in &record.fields {
            let value = match &field.normalized {
                Some(FieldValue::Bool(b)) => json!(b),
                Some(other) => json!(other.render()),
                None => Value::Null,
            };
            // f32 confidences pick up float noise when widened; round to
            // the two decimals the CSV layouts print.
            let confidence = (f64::from(field.confidence) * 100.0).round() / 100.0;
            fields.insert(
                field.key.clone(),
                json!({
                    "value": value,
                    "raw_value": field.raw_value,
                    "confidence": confidence,
                    "source": field.source.as_str(),
                }),
            );
        }
        out.push(json!({
            "document_id": record.id,
            "filer": record.filer,
            "tax_year": record.tax_year,
            "form_type": record.form_type.as_str(),
            "status": record.status.as_str(),
            "fields": Value::Object(fields),
        }));
    }

    let mut bytes = serde_json::to_vec_pretty(&out)?;
    bytes.push(b'\n');
    Ok(bytes)
}
