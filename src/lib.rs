//! TaxClaw: local-first tax document extraction.
//!
//! Ingested PDFs and images are classified into form segments, each segment
//! is extracted against its registered form schema through an inference
//! backend (local Ollama by default, Anthropic cloud behind an explicit
//! privacy acknowledgment), field confidences gate a human review queue,
//! and reviewed records render to wide CSV, long CSV, or JSON.

pub mod backend;
pub mod config;
pub mod export;
pub mod ingest;
pub mod money;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod store;

use tracing_subscriber::EnvFilter;

pub use config::Config;
pub use money::Money;
pub use record::{DocumentRecord, ExtractedField, FieldValue, RecordStatus};
pub use schema::{FormSchema, FormType, SchemaRegistry};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
