//! Local Ollama inference backend.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::response::parse_field_response;
use super::{BackendError, InferenceBackend, RawFieldReading, SegmentPayload};
use crate::config::Config;
use crate::schema::FormSchema;

/// HTTP client for a local Ollama instance. The model must be multimodal
/// when image payloads are used.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.local_model.clone(),
            client,
            timeout_secs: config.request_timeout_secs,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_connect() {
            BackendError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            BackendError::Timeout(self.timeout_secs)
        } else {
            BackendError::Http {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                body: e.to_string(),
            }
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl InferenceBackend for OllamaBackend {
    fn infer(
        &self,
        payload: &SegmentPayload,
        schema: &FormSchema,
    ) -> Result<BTreeMap<String, RawFieldReading>, BackendError> {
        let field_prompt = build_extraction_prompt(schema);
        let (prompt, images) = match payload {
            SegmentPayload::Text(text) => {
                (format!("<document>\n{text}\n</document>\n\n{field_prompt}"), None)
            }
            SegmentPayload::Png(bytes) => {
                let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
                (field_prompt, Some(vec![b64]))
            }
        };

        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            system: EXTRACTION_SYSTEM_PROMPT,
            stream: false,
            images,
            // Extraction must be repeatable; sampling noise is review noise.
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| BackendError::ResponseParsing(e.to_string()))?;

        parse_field_response(&parsed.response, schema)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
