//! Document records and extracted fields: the unit the pipeline produces,
//! the review workflow corrects, and the exporter renders.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::schema::FormType;

/// Who produced a field's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Model,
    Human,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Human => "human",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "model" => Some(Self::Model),
            "human" => Some(Self::Human),
            _ => None,
        }
    }
}

/// Review lifecycle of a whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    PendingReview,
    Reviewed,
    Exported,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Reviewed => "reviewed",
            Self::Exported => "exported",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending_review" => Some(Self::PendingReview),
            "reviewed" => Some(Self::Reviewed),
            "exported" => Some(Self::Exported),
            _ => None,
        }
    }
}

/// A normalized, typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Money(Money),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
    Enum(String),
}

impl FieldValue {
    /// Canonical string rendering, used by exports and persistence.
    /// Every rendering re-parses to the same value under the field's kind.
    pub fn render(&self) -> String {
        match self {
            Self::Money(m) => m.to_string(),
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Enum(s) => s.clone(),
        }
    }
}

/// One extracted form box with its provenance and confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub key: String,
    /// What the backend reported, verbatim. Kept even after a human
    /// correction replaces the normalized value.
    pub raw_value: Option<String>,
    /// Typed value, or `None` when the backend found nothing or
    /// normalization failed.
    pub normalized: Option<FieldValue>,
    /// Stored confidence in [0, 1]. For human-sourced fields this is 1.0;
    /// the pre-correction value lives in the correction log.
    pub confidence: f32,
    pub source: FieldSource,
    pub reviewed: bool,
}

impl ExtractedField {
    /// An absent field: nothing found, zero confidence. Guaranteed to land
    /// in the review queue.
    pub fn absent(key: &str) -> Self {
        Self {
            key: key.to_string(),
            raw_value: None,
            normalized: None,
            confidence: 0.0,
            source: FieldSource::Model,
            reviewed: false,
        }
    }

    /// The confidence used for review flagging. A human correction is
    /// trusted outright, whatever the model originally reported.
    pub fn effective_confidence(&self) -> f32 {
        match self.source {
            FieldSource::Human => 1.0,
            FieldSource::Model => self.confidence,
        }
    }
}

/// Where a record's bytes came from. Multiple records share one source file
/// when a PDF bundles several form instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// SHA-256 of the file content, hex.
    pub hash: String,
    pub original_filename: String,
    pub stored_path: String,
}

/// One extracted form instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub filer: Option<String>,
    pub tax_year: i32,
    pub form_type: FormType,
    pub source_file: SourceFile,
    /// Confidence the classifier assigned to this record's segment.
    pub classifier_confidence: f32,
    /// Set when backend failure degraded the segment to all-absent fields.
    pub extraction_failed: bool,
    /// Schema field order.
    pub fields: Vec<ExtractedField>,
    pub status: RecordStatus,
    /// Optimistic-concurrency version, bumped on every correction.
    pub version: i64,
    pub created_at: NaiveDateTime,
}

impl DocumentRecord {
    /// Stable, content-derived record id: the same file bytes and segment
    /// index always produce the same id, keeping re-ingestion idempotent.
    pub fn stable_id(file_hash: &str, segment_index: usize) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("taxclaw:{file_hash}:{segment_index}").as_bytes(),
        )
    }

    pub fn field(&self, key: &str) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Append-only audit row for a human correction. The original model output
/// and its confidence survive every correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub field_key: String,
    pub prior_raw_value: Option<String>,
    pub prior_value: Option<String>,
    pub prior_confidence: f32,
    pub corrected_value: String,
    pub corrected_at: NaiveDateTime,
}

/// Listing row: enough to show a record in `list` output without loading
/// its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: Uuid,
    pub filer: Option<String>,
    pub tax_year: i32,
    pub form_type: FormType,
    pub status: RecordStatus,
    pub extraction_failed: bool,
    pub original_filename: String,
    pub created_at: NaiveDateTime,
}
