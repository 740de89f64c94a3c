//! Record persistence.
//!
//! The pipeline owns a record until it is saved; afterwards mutation belongs
//! to the review workflow, which may only append corrections; extracted
//! history is never deleted. Writes use optimistic concurrency: a correction
//! against a stale version is rejected and the caller must re-fetch.

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use thiserror::Error;
use uuid::Uuid;

use crate::record::{Correction, DocumentRecord, RecordStatus, RecordSummary};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("record {id} changed since it was read (expected version {expected}, stored {stored}); re-fetch and retry")]
    StaleRecord {
        id: Uuid,
        expected: i64,
        stored: i64,
    },

    #[error("record {id} has no field {key:?}")]
    UnknownField { id: Uuid, key: String },

    #[error("invalid value for field {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Narrow persistence seam the pipeline and CLI depend on.
pub trait RecordStore: Send + Sync {
    fn save(&self, record: &DocumentRecord) -> Result<Uuid, StoreError>;

    fn load(&self, id: &Uuid) -> Result<DocumentRecord, StoreError>;

    /// Apply a human correction. Fails with [`StoreError::StaleRecord`] when
    /// `expected_version` no longer matches; on success the prior value goes
    /// to the append-only correction log, the field becomes human-sourced at
    /// confidence 1.0, and the record version is bumped.
    fn update_field(
        &self,
        id: &Uuid,
        field_key: &str,
        new_value: &str,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    fn list(&self, filer: Option<&str>, tax_year: Option<i32>)
        -> Result<Vec<RecordSummary>, StoreError>;

    /// Records previously extracted from a file with this content hash.
    fn find_by_hash(&self, file_hash: &str) -> Result<Vec<Uuid>, StoreError>;

    fn corrections(&self, id: &Uuid) -> Result<Vec<Correction>, StoreError>;

    fn set_status(&self, id: &Uuid, status: RecordStatus) -> Result<(), StoreError>;
}
