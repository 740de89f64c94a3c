//! End-to-end document processing: a staged file goes in, persisted records
//! come out.
//!
//! Schemas for every classified segment are resolved before any backend call
//! is made, so an unsupported form aborts the whole document instead of
//! leaving a partial batch behind.

use std::sync::Arc;

use uuid::Uuid;

use super::classify::{classify_pages, PageText, Segment};
use super::extract::{extract_segment, RetryPolicy, SegmentExtraction};
use super::review::{evaluate, ReviewPolicy};
use super::PipelineError;
use crate::backend::{InferenceBackend, SegmentPayload};
use crate::ingest::IngestedFile;
use crate::record::{DocumentRecord, RecordStatus, SourceFile};
use crate::schema::{FormSchema, FormType, SchemaRegistry};
use crate::store::RecordStore;

/// What processing one file produced.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Ids of the records for this file, in segment order.
    pub record_ids: Vec<Uuid>,
    /// True when the file's hash was already in the store and no extraction
    /// ran; `record_ids` then names the existing records.
    pub duplicate: bool,
}

pub struct DocumentProcessor {
    registry: Arc<SchemaRegistry>,
    backend: Box<dyn InferenceBackend>,
    store: Arc<dyn RecordStore>,
    review: ReviewPolicy,
    retry: RetryPolicy,
}

impl DocumentProcessor {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        backend: Box<dyn InferenceBackend>,
        store: Arc<dyn RecordStore>,
        review: ReviewPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            backend,
            store,
            review,
            retry,
        }
    }

    /// Process one staged file into persisted records.
    ///
    /// Re-ingesting a file whose content hash is already stored is a no-op
    /// that reports the existing records.
    pub fn process(
        &self,
        staged: &IngestedFile,
        pages: &[PageText],
        filer: Option<&str>,
        tax_year: i32,
    ) -> Result<ProcessOutcome, PipelineError> {
        let existing = self.store.find_by_hash(&staged.hash)?;
        if !existing.is_empty() {
            tracing::info!(
                hash = staged.hash,
                records = existing.len(),
                "file already ingested, skipping extraction"
            );
            return Ok(ProcessOutcome {
                record_ids: existing,
                duplicate: true,
            });
        }

        let segments = classify_pages(pages)?;
        tracing::info!(
            file = staged.original_filename,
            segments = segments.len(),
            "document classified"
        );

        // Resolve every schema up front. An unsupported form fails here,
        // before any backend call.
        let schemas: Vec<Option<Arc<FormSchema>>> = segments
            .iter()
            .map(|seg| match seg.form_type {
                FormType::Unknown => Ok(None),
                form => self.registry.schema_for(form, tax_year).map(Some),
            })
            .collect::<Result<_, _>>()?;

        let extractions = self.extract_all(pages, &segments, &schemas);

        let source = SourceFile {
            hash: staged.hash.clone(),
            original_filename: staged.original_filename.clone(),
            stored_path: staged.stored_path.display().to_string(),
        };

        let mut record_ids = Vec::with_capacity(segments.len());
        for (index, (segment, (schema, extraction))) in segments
            .iter()
            .zip(schemas.iter().zip(extractions))
            .enumerate()
        {
            let mut record = DocumentRecord {
                id: DocumentRecord::stable_id(&staged.hash, index),
                filer: filer.map(str::to_string),
                tax_year,
                form_type: segment.form_type,
                source_file: source.clone(),
                classifier_confidence: segment.confidence,
                extraction_failed: extraction.failed,
                fields: extraction.fields,
                status: RecordStatus::PendingReview,
                version: 1,
                created_at: DocumentRecord::now(),
            };

            let verdict = evaluate(&record, schema.as_deref(), &self.review);
            record.status = if verdict.pending_review {
                RecordStatus::PendingReview
            } else {
                RecordStatus::Reviewed
            };
            if !verdict.flagged_fields.is_empty() {
                tracing::info!(
                    id = %record.id,
                    form = %record.form_type,
                    flagged = ?verdict.flagged_fields,
                    "fields flagged for review"
                );
            }

            record_ids.push(self.store.save(&record)?);
        }

        Ok(ProcessOutcome {
            record_ids,
            duplicate: false,
        })
    }

    /// Extract all segments, one thread per segment with a schema. Unknown
    /// segments get no extraction: an empty field set that review forces
    /// into the pending queue.
    fn extract_all(
        &self,
        pages: &[PageText],
        segments: &[Segment],
        schemas: &[Option<Arc<FormSchema>>],
    ) -> Vec<SegmentExtraction> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = segments
                .iter()
                .zip(schemas)
                .map(|(segment, schema)| {
                    schema.as_ref().map(|schema| {
                        let payload = SegmentPayload::Text(segment_text(pages, segment));
                        scope.spawn(move || {
                            extract_segment(self.backend.as_ref(), &payload, schema, &self.retry)
                        })
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle {
                    Some(handle) => match handle.join() {
                        Ok(extraction) => extraction,
                        Err(_) => SegmentExtraction {
                            fields: Vec::new(),
                            failed: true,
                        },
                    },
                    None => SegmentExtraction {
                        fields: Vec::new(),
                        failed: false,
                    },
                })
                .collect()
        })
    }
}

fn segment_text(pages: &[PageText], segment: &Segment) -> String {
    let (first, last) = segment.pages;
    pages
        .iter()
        .filter(|p| p.number >= first && p.number <= last)
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Re-evaluate a record's status after a correction. A record whose flagged
/// fields have all been corrected leaves the pending queue.
pub fn refresh_status(
    store: &dyn RecordStore,
    registry: &SchemaRegistry,
    policy: &ReviewPolicy,
    id: &Uuid,
) -> Result<RecordStatus, PipelineError> {
    let record = store.load(id)?;
    let schema = registry
        .schema_for(record.form_type, record.tax_year)
        .ok();
    let verdict = evaluate(&record, schema.as_deref(), policy);
    let status = if verdict.pending_review {
        RecordStatus::PendingReview
    } else {
        RecordStatus::Reviewed
    };
    if status != record.status {
        store.set_status(id, status)?;
        tracing::info!(id = %id, from = record.status.as_str(), to = status.as_str(), "record status updated");
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::backend::{BackendError, RawFieldReading};
    use crate::store::{SqliteRecordStore, StoreError};

    /// Backend returning canned readings per form type, counting calls.
    struct CannedBackend {
        responses: BTreeMap<FormType, BTreeMap<String, RawFieldReading>>,
        calls: Arc<Mutex<u32>>,
    }

    impl CannedBackend {
        fn new(responses: BTreeMap<FormType, BTreeMap<String, RawFieldReading>>) -> Self {
            Self {
                responses,
                calls: Arc::new(Mutex::new(0)),
            }
        }

        fn call_counter(&self) -> Arc<Mutex<u32>> {
            self.calls.clone()
        }
    }

    impl InferenceBackend for CannedBackend {
        fn infer(
            &self,
            _payload: &SegmentPayload,
            schema: &FormSchema,
        ) -> Result<BTreeMap<String, RawFieldReading>, BackendError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self
                .responses
                .get(&schema.form_type)
                .cloned()
                .unwrap_or_default())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn infer(
            &self,
            _payload: &SegmentPayload,
            _schema: &FormSchema,
        ) -> Result<BTreeMap<String, RawFieldReading>, BackendError> {
            Err(BackendError::ResponseParsing("not json".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn reading(value: &str, confidence: f32) -> RawFieldReading {
        RawFieldReading {
            raw_value: Some(value.to_string()),
            confidence,
        }
    }

    fn staged(hash: &str) -> IngestedFile {
        IngestedFile {
            hash: hash.to_string(),
            original_filename: "doc.txt".to_string(),
            stored_path: PathBuf::from(format!("/tmp/{hash}_doc.txt")),
        }
    }

    fn div_pages() -> Vec<PageText> {
        vec![PageText {
            number: 1,
            text: "Form 1099-DIV Dividends and Distributions OMB No. 1545-0110".into(),
        }]
    }

    fn processor(backend: Box<dyn InferenceBackend>) -> (DocumentProcessor, Arc<SqliteRecordStore>) {
        let registry = Arc::new(SchemaRegistry::with_builtin());
        let store = Arc::new(SqliteRecordStore::open_in_memory(registry.clone()).unwrap());
        let processor = DocumentProcessor::new(
            registry,
            backend,
            store.clone(),
            ReviewPolicy::default(),
            RetryPolicy {
                attempts: 0,
                initial_backoff: std::time::Duration::ZERO,
            },
        );
        (processor, store)
    }

    /// Readings covering every 1099-DIV field, all above the floors.
    fn confident_div_readings() -> BTreeMap<String, RawFieldReading> {
        let mut div = BTreeMap::new();
        div.insert("payer_name".to_string(), reading("Vanguard", 0.99));
        div.insert("payer_tin".to_string(), reading("12-3456789", 0.98));
        div.insert("recipient_tin".to_string(), reading("987-65-4321", 0.98));
        div.insert(
            "total_ordinary_dividends".to_string(),
            reading("1,234.56", 0.97),
        );
        div.insert("qualified_dividends".to_string(), reading("1,000.00", 0.96));
        div.insert("total_capital_gain".to_string(), reading("0.00", 0.95));
        div.insert("federal_withheld".to_string(), reading("0.00", 0.95));
        div.insert("foreign_tax_paid".to_string(), reading("0.00", 0.95));
        div
    }

    fn div_backend() -> CannedBackend {
        let mut responses = BTreeMap::new();
        responses.insert(FormType::Div1099, confident_div_readings());
        CannedBackend::new(responses)
    }

    #[test]
    fn confident_extraction_lands_reviewed() {
        let (processor, store) = processor(Box::new(div_backend()));
        let outcome = processor
            .process(&staged("aa11"), &div_pages(), Some("alice"), 2025)
            .unwrap();

        assert!(!outcome.duplicate);
        assert_eq!(outcome.record_ids.len(), 1);
        let record = store.load(&outcome.record_ids[0]).unwrap();
        assert_eq!(record.form_type, FormType::Div1099);
        assert_eq!(record.status, RecordStatus::Reviewed);
        assert!(!record.extraction_failed);
        assert_eq!(
            record.field("total_ordinary_dividends").unwrap().raw_value.as_deref(),
            Some("1,234.56")
        );
    }

    #[test]
    fn missing_required_field_forces_pending() {
        let mut div = confident_div_readings();
        // total_ordinary_dividends never reported.
        div.remove("total_ordinary_dividends");
        let mut responses = BTreeMap::new();
        responses.insert(FormType::Div1099, div);
        let (processor, store) = processor(Box::new(CannedBackend::new(responses)));

        let outcome = processor
            .process(&staged("bb22"), &div_pages(), None, 2025)
            .unwrap();
        let record = store.load(&outcome.record_ids[0]).unwrap();
        assert_eq!(record.status, RecordStatus::PendingReview);
        assert!(record.field("total_ordinary_dividends").unwrap().normalized.is_none());
    }

    #[test]
    fn reingest_is_a_no_op() {
        let backend = div_backend();
        let (processor, _store) = processor(Box::new(backend));
        let first = processor
            .process(&staged("cc33"), &div_pages(), None, 2025)
            .unwrap();
        let second = processor
            .process(&staged("cc33"), &div_pages(), None, 2025)
            .unwrap();

        assert!(second.duplicate);
        assert_eq!(first.record_ids, second.record_ids);
    }

    #[test]
    fn record_ids_are_stable_across_runs() {
        let (first, _) = processor(Box::new(div_backend()));
        let (second, _) = processor(Box::new(div_backend()));
        let a = first
            .process(&staged("dd44"), &div_pages(), None, 2025)
            .unwrap();
        let b = second
            .process(&staged("dd44"), &div_pages(), None, 2025)
            .unwrap();
        assert_eq!(a.record_ids, b.record_ids);
    }

    #[test]
    fn multi_form_file_produces_one_record_per_segment() {
        let mut responses = BTreeMap::new();
        let mut div = BTreeMap::new();
        div.insert(
            "total_ordinary_dividends".to_string(),
            reading("10.00", 0.96),
        );
        responses.insert(FormType::Div1099, div);
        let mut int = BTreeMap::new();
        int.insert("interest_income".to_string(), reading("42.00", 0.96));
        responses.insert(FormType::Int1099, int);
        let (processor, store) = processor(Box::new(CannedBackend::new(responses)));

        let pages = vec![
            PageText {
                number: 1,
                text: "Form 1099-DIV Dividends and Distributions".into(),
            },
            PageText {
                number: 2,
                text: "Form 1099-INT Interest Income OMB No. 1545-0112".into(),
            },
        ];
        let outcome = processor
            .process(&staged("ee55"), &pages, None, 2025)
            .unwrap();
        assert_eq!(outcome.record_ids.len(), 2);
        let forms: Vec<FormType> = outcome
            .record_ids
            .iter()
            .map(|id| store.load(id).unwrap().form_type)
            .collect();
        assert_eq!(forms, vec![FormType::Div1099, FormType::Int1099]);
    }

    #[test]
    fn unknown_segment_is_persisted_without_backend_call() {
        let backend = CannedBackend::new(BTreeMap::new());
        let calls = backend.call_counter();
        let (processor, store) = processor(Box::new(backend));

        let pages = vec![PageText {
            number: 1,
            text: "handwritten grocery list, nothing form-like".into(),
        }];
        let outcome = processor
            .process(&staged("ff66"), &pages, None, 2025)
            .unwrap();

        let record = store.load(&outcome.record_ids[0]).unwrap();
        assert_eq!(record.form_type, FormType::Unknown);
        assert_eq!(record.status, RecordStatus::PendingReview);
        assert!(record.fields.is_empty());
        // No extraction ran for the unknown segment.
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn backend_failure_degrades_but_persists() {
        let (processor, store) = processor(Box::new(FailingBackend));
        let outcome = processor
            .process(&staged("0077"), &div_pages(), None, 2025)
            .unwrap();

        let record = store.load(&outcome.record_ids[0]).unwrap();
        assert!(record.extraction_failed);
        assert_eq!(record.status, RecordStatus::PendingReview);
        assert!(record.fields.iter().all(|f| f.normalized.is_none()));
    }

    #[test]
    fn correction_clears_pending_status() {
        let mut div = confident_div_readings();
        // The only shaky reading: below both floors.
        div.insert(
            "total_ordinary_dividends".to_string(),
            reading("1,234.56", 0.50),
        );
        let mut responses = BTreeMap::new();
        responses.insert(FormType::Div1099, div);
        let (processor, store) = processor(Box::new(CannedBackend::new(responses)));

        let registry = SchemaRegistry::with_builtin();
        let outcome = processor
            .process(&staged("1188"), &div_pages(), None, 2025)
            .unwrap();
        let id = outcome.record_ids[0];
        assert_eq!(store.load(&id).unwrap().status, RecordStatus::PendingReview);

        store
            .update_field(&id, "total_ordinary_dividends", "1234.56", 1)
            .unwrap();
        let status =
            refresh_status(store.as_ref(), &registry, &ReviewPolicy::default(), &id).unwrap();
        assert_eq!(status, RecordStatus::Reviewed);
    }

    #[test]
    fn unsupported_year_aborts_before_extraction() {
        let backend = div_backend();
        let (processor, store) = processor(Box::new(backend));
        let err = processor
            .process(&staged("2299"), &div_pages(), None, 1999)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
        // Nothing half-written.
        assert!(matches!(
            store.load(&DocumentRecord::stable_id("2299", 0)),
            Err(StoreError::NotFound(_))
        ));
    }
}
