//! The extraction pipeline: classify → segment → extract → evaluate.

pub mod classify;
pub mod extract;
pub mod normalize;
pub mod processor;
pub mod review;

use thiserror::Error;

use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::schema::SchemaError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Classify(#[from] classify::ClassifyError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}
