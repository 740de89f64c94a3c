//! Anthropic cloud inference backend.
//!
//! Only constructed after the privacy acknowledgment check in
//! [`super::backend_for`] passes; by the time this type exists, the user
//! has explicitly opted in to sending document content off-machine.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::response::parse_field_response;
use super::{BackendError, InferenceBackend, RawFieldReading, SegmentPayload};
use crate::config::Config;
use crate::schema::FormSchema;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

pub struct CloudBackend {
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl CloudBackend {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: config.cloud_api_key.clone(),
            model: config.cloud_model.clone(),
            client,
            timeout_secs: config.request_timeout_secs,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

impl InferenceBackend for CloudBackend {
    fn infer(
        &self,
        payload: &SegmentPayload,
        schema: &FormSchema,
    ) -> Result<BTreeMap<String, RawFieldReading>, BackendError> {
        let field_prompt = build_extraction_prompt(schema);
        let content = match payload {
            SegmentPayload::Text(text) => vec![ContentBlock::Text {
                text: format!("<document>\n{text}\n</document>\n\n{field_prompt}"),
            }],
            SegmentPayload::Png(bytes) => vec![
                ContentBlock::Image {
                    source: ImageSource {
                        source_type: "base64",
                        media_type: "image/png",
                        data: base64::engine::general_purpose::STANDARD.encode(bytes),
                    },
                },
                ContentBlock::Text { text: field_prompt },
            ],
        };

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: EXTRACTION_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    BackendError::Connection(API_URL.to_string())
                } else if e.is_timeout() {
                    BackendError::Timeout(self.timeout_secs)
                } else {
                    BackendError::Http {
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        body: e.to_string(),
                    }
                }
            })?;

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

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| BackendError::ResponseParsing(e.to_string()))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect();

        parse_field_response(&text, schema)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
