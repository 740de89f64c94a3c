//! End-to-end pipeline tests: file on disk -> staged -> classified ->
//! extracted -> persisted -> corrected -> exported.

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use taxclaw::backend::{backend_for, BackendError, InferenceBackend, RawFieldReading, SegmentPayload};
use taxclaw::config::{BackendKind, Config, ConfigError};
use taxclaw::export::{export, ExportFormat};
use taxclaw::ingest::{read_page_text, stage_file};
use taxclaw::pipeline::extract::RetryPolicy;
use taxclaw::pipeline::processor::{refresh_status, DocumentProcessor};
use taxclaw::pipeline::review::ReviewPolicy;
use taxclaw::record::FieldSource;
use taxclaw::schema::FormSchema;
use taxclaw::store::{RecordStore, SqliteRecordStore};
use taxclaw::{FieldValue, FormType, Money, RecordStatus, SchemaRegistry};

const DIV_PAGE: &str = "\
Form 1099-DIV\n\
Dividends and Distributions\n\
OMB No. 1545-0110\n\
PAYER'S name: Vanguard Brokerage\n\
1a Total ordinary dividends  1,234.56\n";

/// Backend answering from a fixed reading table, confidence 0.97 for every
/// key it knows and silence for the rest.
struct TableBackend {
    readings: BTreeMap<&'static str, &'static str>,
}

impl InferenceBackend for TableBackend {
    fn infer(
        &self,
        _payload: &SegmentPayload,
        schema: &FormSchema,
    ) -> Result<BTreeMap<String, RawFieldReading>, BackendError> {
        Ok(schema
            .fields
            .iter()
            .filter_map(|def| {
                self.readings.get(def.key.as_str()).map(|value| {
                    (
                        def.key.clone(),
                        RawFieldReading {
                            raw_value: Some(value.to_string()),
                            confidence: 0.97,
                        },
                    )
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        "table"
    }
}

fn full_div_backend() -> TableBackend {
    let readings = BTreeMap::from([
        ("payer_name", "Vanguard Brokerage"),
        ("payer_tin", "12-3456789"),
        ("recipient_tin", "987-65-4321"),
        ("total_ordinary_dividends", "1,234.56"),
        ("qualified_dividends", "1,000.00"),
        ("total_capital_gain", "0.00"),
        ("federal_withheld", "0.00"),
        ("foreign_tax_paid", "0.00"),
    ]);
    TableBackend { readings }
}

struct Harness {
    _dir: TempDir,
    registry: Arc<SchemaRegistry>,
    store: Arc<SqliteRecordStore>,
    processor: DocumentProcessor,
    uploads: std::path::PathBuf,
    source: std::path::PathBuf,
}

fn harness(backend: Box<dyn InferenceBackend>, page: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("statement.txt");
    std::fs::write(&source, page).unwrap();
    let uploads = dir.path().join("uploads");

    let registry = Arc::new(SchemaRegistry::with_builtin());
    let store =
        Arc::new(SqliteRecordStore::open(&dir.path().join("tax.db"), registry.clone()).unwrap());
    let processor = DocumentProcessor::new(
        registry.clone(),
        backend,
        store.clone(),
        ReviewPolicy::default(),
        RetryPolicy {
            attempts: 0,
            initial_backoff: std::time::Duration::ZERO,
        },
    );
    Harness {
        _dir: dir,
        registry,
        store,
        processor,
        uploads,
        source,
    }
}

fn ingest(h: &Harness) -> Vec<Uuid> {
    let staged = stage_file(&h.source, &h.uploads).unwrap();
    let pages = read_page_text(&staged.stored_path).unwrap();
    h.processor
        .process(&staged, &pages, Some("alice"), 2025)
        .unwrap()
        .record_ids
}

#[test]
fn confident_div_document_is_reviewed_and_exports_normalized_money() {
    let h = harness(Box::new(full_div_backend()), DIV_PAGE);
    let ids = ingest(&h);
    assert_eq!(ids.len(), 1);

    let record = h.store.load(&ids[0]).unwrap();
    assert_eq!(record.form_type, FormType::Div1099);
    assert_eq!(record.status, RecordStatus::Reviewed);
    assert_eq!(
        record.field("total_ordinary_dividends").unwrap().normalized,
        Some(FieldValue::Money(Money::from_cents(123_456)))
    );

    let bytes = export(&[record], &h.registry, ExportFormat::WideCsv).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();
    let row: Vec<&str> = lines.next().unwrap().split(',').collect();
    let col = header
        .iter()
        .position(|c| *c == "total_ordinary_dividends")
        .unwrap();
    assert_eq!(row[col], "1234.56");
}

#[test]
fn missing_required_reading_lands_in_review_queue() {
    let mut backend = full_div_backend();
    backend.readings.remove("total_ordinary_dividends");
    let h = harness(Box::new(backend), DIV_PAGE);
    let ids = ingest(&h);

    let record = h.store.load(&ids[0]).unwrap();
    assert_eq!(record.status, RecordStatus::PendingReview);
    let field = record.field("total_ordinary_dividends").unwrap();
    assert!(field.normalized.is_none());
    assert_eq!(field.confidence, 0.0);
}

#[test]
fn reingesting_the_same_bytes_creates_no_new_records() {
    let h = harness(Box::new(full_div_backend()), DIV_PAGE);
    let first = ingest(&h);
    let second = ingest(&h);
    assert_eq!(first, second);
    assert_eq!(h.store.list(None, None).unwrap().len(), 1);
}

#[test]
fn human_correction_is_sticky_across_reevaluation() {
    let mut backend = full_div_backend();
    backend.readings.remove("total_ordinary_dividends");
    let h = harness(Box::new(backend), DIV_PAGE);
    let ids = ingest(&h);
    let id = ids[0];

    h.store
        .update_field(&id, "total_ordinary_dividends", "1234.56", 1)
        .unwrap();
    let status = refresh_status(
        h.store.as_ref(),
        &h.registry,
        &ReviewPolicy::default(),
        &id,
    )
    .unwrap();
    assert_eq!(status, RecordStatus::Reviewed);

    // Re-running the evaluator never re-flags the human-sourced field, even
    // with a stricter policy.
    let strict = ReviewPolicy {
        review_floor: 0.99,
        required_floor: 0.999,
        classifier_floor: 0.60,
    };
    let record = h.store.load(&id).unwrap();
    let field = record.field("total_ordinary_dividends").unwrap();
    assert_eq!(field.source, FieldSource::Human);
    let verdict = taxclaw::pipeline::review::evaluate(
        &record,
        h.registry
            .schema_for(FormType::Div1099, 2025)
            .ok()
            .as_deref(),
        &strict,
    );
    assert!(!verdict
        .flagged_fields
        .contains(&"total_ordinary_dividends".to_string()));
}

#[test]
fn correction_history_survives_in_long_export() {
    let h = harness(Box::new(full_div_backend()), DIV_PAGE);
    let ids = ingest(&h);
    h.store
        .update_field(&ids[0], "total_ordinary_dividends", "2000.00", 1)
        .unwrap();

    let record = h.store.load(&ids[0]).unwrap();
    // The audit trail keeps the model's original raw reading.
    let field = record.field("total_ordinary_dividends").unwrap();
    assert_eq!(field.raw_value.as_deref(), Some("1,234.56"));
    assert_eq!(field.normalized, Some(FieldValue::Money(Money::from_cents(200_000))));

    let bytes = export(&[record], &h.registry, ExportFormat::LongCsv).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let row = text
        .lines()
        .find(|l| l.contains("total_ordinary_dividends"))
        .unwrap();
    assert!(row.ends_with("total_ordinary_dividends,2000.00,1.00,human"));
}

#[test]
fn cloud_mode_without_acknowledgment_fails_before_any_call() {
    let config = Config {
        backend: BackendKind::Cloud,
        cloud_ack: false,
        cloud_api_key: "sk-test".to_string(),
        ..Config::default()
    };
    assert!(matches!(
        backend_for(&config),
        Err(ConfigError::CloudModeNotAcknowledged)
    ));
}

#[test]
fn acknowledged_cloud_mode_without_key_still_fails() {
    let config = Config {
        backend: BackendKind::Cloud,
        cloud_ack: true,
        cloud_api_key: String::new(),
        ..Config::default()
    };
    assert!(matches!(
        backend_for(&config),
        Err(ConfigError::MissingApiKey)
    ));
}

#[test]
fn multi_form_page_text_yields_one_record_per_form() {
    let pages = "Form 1099-DIV Dividends and Distributions\n\
                 1a Total ordinary dividends 10.00\n\
                 \u{c}\
                 Form 1099-INT Interest Income OMB No. 1545-0112\n\
                 1 Interest income 42.00\n";
    let mut backend = full_div_backend();
    backend.readings.insert("interest_income", "42.00");
    let h = harness(Box::new(backend), pages);
    let ids = ingest(&h);
    assert_eq!(ids.len(), 2);

    let forms: Vec<FormType> = ids
        .iter()
        .map(|id| h.store.load(id).unwrap().form_type)
        .collect();
    assert_eq!(forms, vec![FormType::Div1099, FormType::Int1099]);
    // Both records share the source file.
    let a = h.store.load(&ids[0]).unwrap();
    let b = h.store.load(&ids[1]).unwrap();
    assert_eq!(a.source_file.hash, b.source_file.hash);
}

#[test]
fn export_annotation_does_not_touch_field_state() {
    let h = harness(Box::new(full_div_backend()), DIV_PAGE);
    let ids = ingest(&h);
    let before = h.store.load(&ids[0]).unwrap();

    let _ = export(&[before.clone()], &h.registry, ExportFormat::Json).unwrap();
    h.store.set_status(&ids[0], RecordStatus::Exported).unwrap();

    let after = h.store.load(&ids[0]).unwrap();
    assert_eq!(after.status, RecordStatus::Exported);
    assert_eq!(after.version, before.version);
    for (x, y) in before.fields.iter().zip(&after.fields) {
        assert_eq!(x.key, y.key);
        assert_eq!(x.confidence, y.confidence);
        assert_eq!(x.normalized, y.normalized);
    }
}
