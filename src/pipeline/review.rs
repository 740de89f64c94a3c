//! Confidence evaluation and the review queue.
//!
//! A pure function of a record's fields plus the configured thresholds.
//! Nothing here touches storage, so the review state can be recomputed on
//! demand and exporting never mutates it.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::record::{DocumentRecord, FieldSource};
use crate::schema::FormSchema;

/// Confidence thresholds gating automatic acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPolicy {
    /// Any field below this is flagged.
    pub review_floor: f32,
    /// Required fields must clear this, usually higher, floor.
    pub required_floor: f32,
    /// Classifier confidence below this forces the record into review
    /// regardless of field-level confidence.
    pub classifier_floor: f32,
}

impl ReviewPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            review_floor: config.review_floor,
            required_floor: config.required_floor,
            classifier_floor: config.classifier_floor,
        }
    }
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            review_floor: 0.70,
            required_floor: 0.85,
            classifier_floor: 0.60,
        }
    }
}

/// Outcome of evaluating one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvaluation {
    pub pending_review: bool,
    /// Field keys needing human attention, in record (schema) order.
    pub flagged_fields: Vec<String>,
}

/// Evaluate a record against the policy.
///
/// `schema` is `None` for unknown-form records, which are always pending.
/// Human-sourced fields are never flagged: a correction is trusted at 1.0
/// effective confidence from then on, whatever confidence the audit history
/// retains.
pub fn evaluate(
    record: &DocumentRecord,
    schema: Option<&FormSchema>,
    policy: &ReviewPolicy,
) -> ReviewEvaluation {
    let mut flagged = Vec::new();
    for field in &record.fields {
        if field.source == FieldSource::Human {
            continue;
        }
        let confidence = field.effective_confidence();
        let required = schema
            .and_then(|s| s.field(&field.key))
            .map(|d| d.required)
            .unwrap_or(false);

        if confidence < policy.review_floor || (required && confidence < policy.required_floor) {
            flagged.push(field.key.clone());
        }
    }

    let forced = record.extraction_failed
        || record.classifier_confidence < policy.classifier_floor
        || schema.is_none();

    ReviewEvaluation {
        pending_review: forced || !flagged.is_empty(),
        flagged_fields: flagged,
    }
}
