//! Schema-driven field extraction.
//!
//! One call per segment: the backend is given the schema's field list and
//! returns one reading per key. Everything that can go wrong below the
//! record level is absorbed here: normalization failures become absent
//! zero-confidence fields, transient backend errors are retried with
//! exponential backoff, and a persistent failure degrades the whole segment
//! to an all-absent field set instead of raising past the pipeline boundary.

use std::time::Duration;

use crate::backend::{InferenceBackend, SegmentPayload};
use crate::config::Config;
use crate::record::{ExtractedField, FieldSource};
use crate::schema::FormSchema;

use super::normalize::normalize_value;

/// Bounded retry for transient backend failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub attempts: u32,
    /// Initial backoff, doubled per retry.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_count,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

/// Extraction result for one segment.
#[derive(Debug, Clone)]
pub struct SegmentExtraction {
    /// One field per schema definition, in schema order.
    pub fields: Vec<ExtractedField>,
    /// True when the backend failed persistently and the field set was
    /// degraded to all-absent.
    pub failed: bool,
}

/// Extract one segment against its schema.
pub fn extract_segment(
    backend: &dyn InferenceBackend,
    payload: &SegmentPayload,
    schema: &FormSchema,
    retry: &RetryPolicy,
) -> SegmentExtraction {
    let mut attempt = 0u32;
    let readings = loop {
        match backend.infer(payload, schema) {
            Ok(readings) => break readings,
            Err(e) if e.is_transient() && attempt < retry.attempts => {
                let backoff = retry.backoff_for(attempt);
                tracing::warn!(
                    backend = backend.name(),
                    form = %schema.form_type,
                    attempt = attempt + 1,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient backend failure, retrying"
                );
                std::thread::sleep(backoff);
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    backend = backend.name(),
                    form = %schema.form_type,
                    error = %e,
                    "backend failed, degrading segment to absent fields"
                );
                return SegmentExtraction {
                    fields: schema.keys().map(ExtractedField::absent).collect(),
                    failed: true,
                };
            }
        }
    };

    let fields = schema
        .fields
        .iter()
        .map(|def| {
            let reading = readings.get(&def.key);
            let raw = reading.and_then(|r| r.raw_value.clone());
            let confidence = reading.map(|r| r.confidence).unwrap_or(0.0);
            match raw {
                Some(raw_value) => match normalize_value(def, &raw_value) {
                    Ok(normalized) => ExtractedField {
                        key: def.key.clone(),
                        raw_value: Some(raw_value),
                        normalized: Some(normalized),
                        confidence,
                        source: FieldSource::Model,
                        reviewed: false,
                    },
                    Err(e) => {
                        tracing::debug!(
                            key = def.key,
                            error = %e,
                            "normalization failed, forcing field into review"
                        );
                        ExtractedField {
                            key: def.key.clone(),
                            raw_value: Some(raw_value),
                            normalized: None,
                            confidence: 0.0,
                            source: FieldSource::Model,
                            reviewed: false,
                        }
                    }
                },
                None => ExtractedField::absent(&def.key),
            }
        })
        .collect();

    SegmentExtraction {
        fields,
        failed: false,
    }
}
