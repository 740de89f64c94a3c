//! Inference backends.
//!
//! The pipeline never talks HTTP directly: it hands a segment payload and a
//! form schema to an [`InferenceBackend`] and gets back one reading per
//! schema key. Two implementations ship: a local Ollama client (default)
//! and an Anthropic cloud client gated behind the privacy acknowledgment.
//! Backend selection is a configuration decision made once, before any
//! extraction starts.

pub mod cloud;
pub mod ollama;
pub mod prompt;
pub mod response;

pub use cloud::CloudBackend;
pub use ollama::OllamaBackend;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::{BackendKind, Config, ConfigError};
use crate::schema::FormSchema;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("cannot reach inference backend at {0}")]
    Connection(String),

    #[error("inference request timed out after {0}s")]
    Timeout(u64),

    #[error("inference backend rate limited the request")]
    RateLimited,

    #[error("inference backend returned status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    ResponseParsing(String),
}

impl BackendError {
    /// Transient failures are retried by the extractor; everything else is
    /// treated as a persistent failure for the segment.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::RateLimited => true,
            Self::Http { status, .. } => *status >= 500,
            Self::ResponseParsing(_) => false,
        }
    }
}

/// What the backend sees for one segment: either pre-extracted page text or
/// a rendered page image (base64-encoded on the wire).
#[derive(Debug, Clone)]
pub enum SegmentPayload {
    Text(String),
    Png(Vec<u8>),
}

/// One field reading as reported by the backend: the raw string it saw
/// (`None` for an explicit "not found") and its self-reported confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldReading {
    pub raw_value: Option<String>,
    pub confidence: f32,
}

/// Contract every inference backend implements.
///
/// The returned map contains only keys from the supplied schema (a backend
/// cannot invent fields) and at most one reading per key. Missing keys are
/// equivalent to a "not found" reading.
pub trait InferenceBackend: Send + Sync {
    fn infer(
        &self,
        payload: &SegmentPayload,
        schema: &FormSchema,
    ) -> Result<BTreeMap<String, RawFieldReading>, BackendError>;

    fn name(&self) -> &str;
}

/// Build the configured backend. Cloud mode fails here, before any network
/// call, unless the privacy acknowledgment and API key are present.
pub fn backend_for(config: &Config) -> Result<Box<dyn InferenceBackend>, ConfigError> {
    config.ensure_cloud_acknowledged()?;
    match config.backend {
        BackendKind::Local => Ok(Box::new(OllamaBackend::new(config))),
        BackendKind::Cloud => Ok(Box::new(CloudBackend::new(config))),
    }
}
