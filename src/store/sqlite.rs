//! SQLite-backed record store.
//!
//! Schema-aware: corrections are normalized against the registered form
//! schema before they are accepted, so the store never holds a human value
//! that fails the field's type.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::pipeline::normalize::normalize_value;
use crate::record::{
    Correction, DocumentRecord, ExtractedField, FieldSource, RecordStatus, RecordSummary,
    SourceFile,
};
use crate::schema::{FormType, SchemaRegistry};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
  id TEXT PRIMARY KEY,
  file_hash TEXT NOT NULL,
  original_filename TEXT NOT NULL,
  stored_path TEXT NOT NULL,
  filer TEXT,
  tax_year INTEGER NOT NULL,
  form_type TEXT NOT NULL,
  classifier_confidence REAL NOT NULL,
  extraction_failed INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL,
  version INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(file_hash);

CREATE TABLE IF NOT EXISTS fields (
  document_id TEXT NOT NULL REFERENCES documents(id),
  position INTEGER NOT NULL,
  key TEXT NOT NULL,
  raw_value TEXT,
  normalized_value TEXT,
  confidence REAL NOT NULL,
  source TEXT NOT NULL,
  reviewed INTEGER NOT NULL DEFAULT 0,
  PRIMARY KEY (document_id, key)
);

CREATE TABLE IF NOT EXISTS field_corrections (
  id TEXT PRIMARY KEY,
  document_id TEXT NOT NULL REFERENCES documents(id),
  field_key TEXT NOT NULL,
  prior_raw_value TEXT,
  prior_value TEXT,
  prior_confidence REAL NOT NULL,
  corrected_value TEXT NOT NULL,
  corrected_at TEXT NOT NULL
);
";

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    registry: Arc<SchemaRegistry>,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &std::path::Path, registry: Arc<SchemaRegistry>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory(registry: Arc<SchemaRegistry>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    fn load_fields(tx: &Connection, id: &Uuid, form_type: FormType, tax_year: i32, registry: &SchemaRegistry)
        -> Result<Vec<ExtractedField>, StoreError>
    {
        let schema = registry.schema_for(form_type, tax_year).ok();
        let mut stmt = tx.prepare(
            "SELECT key, raw_value, normalized_value, confidence, source, reviewed
             FROM fields WHERE document_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut fields = Vec::new();
        for row in rows {
            let (key, raw_value, stored, confidence, source, reviewed) = row?;
            // Canonical renderings re-normalize to the same typed value.
            let normalized = match (&schema, stored) {
                (Some(schema), Some(stored)) => schema
                    .field(&key)
                    .and_then(|def| normalize_value(def, &stored).ok()),
                _ => None,
            };
            fields.push(ExtractedField {
                key,
                raw_value,
                normalized,
                confidence: confidence as f32,
                source: FieldSource::from_str(&source).unwrap_or(FieldSource::Model),
                reviewed,
            });
        }
        Ok(fields)
    }

    fn load_record(tx: &Connection, id: &Uuid, registry: &SchemaRegistry) -> Result<DocumentRecord, StoreError> {
        let row = tx
            .query_row(
                "SELECT file_hash, original_filename, stored_path, filer, tax_year, form_type,
                        classifier_confidence, extraction_failed, status, version, created_at
                 FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i32>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, bool>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, chrono::NaiveDateTime>(10)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound(*id))?;

        let (hash, original_filename, stored_path, filer, tax_year, form_type_str,
             classifier_confidence, extraction_failed, status, version, created_at) = row;

        let form_type = FormType::from_str(&form_type_str).unwrap_or(FormType::Unknown);
        let fields = Self::load_fields(tx, id, form_type, tax_year, registry)?;

        Ok(DocumentRecord {
            id: *id,
            filer,
            tax_year,
            form_type,
            source_file: SourceFile {
                hash,
                original_filename,
                stored_path,
            },
            classifier_confidence: classifier_confidence as f32,
            extraction_failed,
            fields,
            status: RecordStatus::from_str(&status).unwrap_or(RecordStatus::PendingReview),
            version,
            created_at,
        })
    }

    fn apply_correction(
        tx: &Transaction<'_>,
        registry: &SchemaRegistry,
        id: &Uuid,
        field_key: &str,
        new_value: &str,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let meta = tx
            .query_row(
                "SELECT version, form_type, tax_year FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound(*id))?;
        let (stored_version, form_type_str, tax_year) = meta;

        if stored_version != expected_version {
            return Err(StoreError::StaleRecord {
                id: *id,
                expected: expected_version,
                stored: stored_version,
            });
        }

        let prior = tx
            .query_row(
                "SELECT raw_value, normalized_value, confidence FROM fields
                 WHERE document_id = ?1 AND key = ?2",
                params![id.to_string(), field_key],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownField {
                id: *id,
                key: field_key.to_string(),
            })?;
        let (prior_raw, prior_value, prior_confidence) = prior;

        // Validate the human value against the field's schema type.
        let form_type = FormType::from_str(&form_type_str).unwrap_or(FormType::Unknown);
        let schema = registry
            .schema_for(form_type, tax_year)
            .map_err(|_| StoreError::UnknownField {
                id: *id,
                key: field_key.to_string(),
            })?;
        let def = schema.field(field_key).ok_or_else(|| StoreError::UnknownField {
            id: *id,
            key: field_key.to_string(),
        })?;
        let normalized = normalize_value(def, new_value).map_err(|e| StoreError::InvalidValue {
            key: field_key.to_string(),
            reason: e.to_string(),
        })?;
        let rendered = normalized.render();

        // Append-only audit: the model's value and its confidence survive.
        tx.execute(
            "INSERT INTO field_corrections
               (id, document_id, field_key, prior_raw_value, prior_value, prior_confidence,
                corrected_value, corrected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                id.to_string(),
                field_key,
                prior_raw,
                prior_value,
                prior_confidence,
                rendered,
                Utc::now().naive_utc(),
            ],
        )?;

        // The field becomes human-sourced at confidence 1.0. raw_value keeps
        // what the model reported; the correction replaces only the
        // normalized value.
        tx.execute(
            "UPDATE fields SET normalized_value = ?1, confidence = 1.0, source = 'human',
                               reviewed = 1
             WHERE document_id = ?2 AND key = ?3",
            params![rendered, id.to_string(), field_key],
        )?;

        tx.execute(
            "UPDATE documents SET version = version + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn save(&self, record: &DocumentRecord) -> Result<Uuid, StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO documents
               (id, file_hash, original_filename, stored_path, filer, tax_year, form_type,
                classifier_confidence, extraction_failed, status, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id.to_string(),
                record.source_file.hash,
                record.source_file.original_filename,
                record.source_file.stored_path,
                record.filer,
                record.tax_year,
                record.form_type.as_str(),
                record.classifier_confidence as f64,
                record.extraction_failed,
                record.status.as_str(),
                record.version,
                record.created_at,
            ],
        )?;

        for (position, field) in record.fields.iter().enumerate() {
            tx.execute(
                "INSERT INTO fields
                   (document_id, position, key, raw_value, normalized_value, confidence,
                    source, reviewed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.to_string(),
                    position as i64,
                    field.key,
                    field.raw_value,
                    field.normalized.as_ref().map(|v| v.render()),
                    field.confidence as f64,
                    field.source.as_str(),
                    field.reviewed,
                ],
            )?;
        }

        tx.commit()?;
        tracing::info!(id = %record.id, form = %record.form_type, "record saved");
        Ok(record.id)
    }

    fn load(&self, id: &Uuid) -> Result<DocumentRecord, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::load_record(&conn, id, &self.registry)
    }

    fn update_field(
        &self,
        id: &Uuid,
        field_key: &str,
        new_value: &str,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        Self::apply_correction(&tx, &self.registry, id, field_key, new_value, expected_version)?;
        tx.commit()?;
        tracing::info!(id = %id, key = field_key, "human correction applied");
        Ok(())
    }

    fn list(
        &self,
        filer: Option<&str>,
        tax_year: Option<i32>,
    ) -> Result<Vec<RecordSummary>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut sql = String::from(
            "SELECT id, filer, tax_year, form_type, status, extraction_failed,
                    original_filename, created_at
             FROM documents WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(filer) = filer {
            sql.push_str(" AND filer = ?");
            params_vec.push(Box::new(filer.to_string()));
        }
        if let Some(year) = tax_year {
            sql.push_str(" AND tax_year = ?");
            params_vec.push(Box::new(year));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, chrono::NaiveDateTime>(7)?,
                ))
            },
        )?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, filer, tax_year, form_type, status, extraction_failed, filename, created_at) =
                row?;
            summaries.push(RecordSummary {
                id: Uuid::parse_str(&id).map_err(|_| StoreError::NotFound(Uuid::nil()))?,
                filer,
                tax_year,
                form_type: FormType::from_str(&form_type).unwrap_or(FormType::Unknown),
                status: RecordStatus::from_str(&status).unwrap_or(RecordStatus::PendingReview),
                extraction_failed,
                original_filename: filename,
                created_at,
            });
        }
        Ok(summaries)
    }

    fn find_by_hash(&self, file_hash: &str) -> Result<Vec<Uuid>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt =
            conn.prepare("SELECT id FROM documents WHERE file_hash = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![file_hash], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            if let Ok(id) = Uuid::parse_str(&row?) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn corrections(&self, id: &Uuid) -> Result<Vec<Correction>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT id, field_key, prior_raw_value, prior_value, prior_confidence,
                    corrected_value, corrected_at
             FROM field_corrections WHERE document_id = ?1 ORDER BY corrected_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, chrono::NaiveDateTime>(6)?,
            ))
        })?;

        let mut corrections = Vec::new();
        for row in rows {
            let (cid, field_key, prior_raw, prior_value, prior_confidence, corrected, at) = row?;
            corrections.push(Correction {
                id: Uuid::parse_str(&cid).unwrap_or_else(|_| Uuid::nil()),
                document_id: *id,
                field_key,
                prior_raw_value: prior_raw,
                prior_value,
                prior_confidence: prior_confidence as f32,
                corrected_value: corrected,
                corrected_at: at,
            });
        }
        Ok(corrections)
    }

    fn set_status(&self, id: &Uuid, status: RecordStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let changed = conn.execute(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(*id));
        }
        Ok(())
    }
}
