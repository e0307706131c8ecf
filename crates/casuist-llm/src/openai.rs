//! OpenAI backends (`/v1/responses`, `/v1/embeddings`).

use std::time::Duration;

use casuist_relevance::{EmbeddingProvider, ProviderError};
use serde::Deserialize;
use serde_json::json;

use crate::chat::ChatBackend;
use crate::settings::{default_openai_base_url, normalize_http_base_url, openai_api_key, DEFAULT_OPENAI_BASE_URL};
use crate::{http_client, transport_error, LlmError};

fn base_url(base: Option<&str>) -> String {
    base.map(|b| normalize_http_base_url(b, DEFAULT_OPENAI_BASE_URL))
        .unwrap_or_else(default_openai_base_url)
}

fn http_error(resp: reqwest::blocking::Response) -> LlmError {
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    LlmError::Status { status, body }
}

/// Concatenate the `output_text` parts of every `message` item.
pub fn extract_output_text(v: &serde_json::Value) -> Option<String> {
    let mut out = String::new();
    for item in v.get("output")?.as_array()? {
        if item.get("type").and_then(|x| x.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|x| x.as_array()) else {
            continue;
        };
        for c in content {
            if c.get("type").and_then(|x| x.as_str()) != Some("output_text") {
                continue;
            }
            if let Some(t) = c.get("text").and_then(|x| x.as_str()) {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(t);
            }
        }
    }
    let trimmed = out.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Option<Duration>,
    client: reqwest::blocking::Client,
}

impl OpenAiChat {
    /// Reads the key from `OPENAI_API_KEY`.
    pub fn new(base: Option<&str>, model: impl Into<String>, timeout: Option<Duration>) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url(base),
            api_key: openai_api_key()?,
            model: model.into(),
            timeout,
            client: http_client(timeout)?,
        })
    }
}

impl ChatBackend for OpenAiChat {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, instructions: &str, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let url = format!("{}/v1/responses", self.base_url);
        let mut body = json!({
            "model": self.model,
            "input": prompt,
            "instructions": instructions,
        });
        if json_mode {
            body["text"] = json!({ "format": { "type": "json_object" } });
        }
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| transport_error(e, &url, self.timeout))?;
        if !resp.status().is_success() {
            return Err(http_error(resp));
        }
        let v: serde_json::Value = resp
            .json()
            .map_err(|e| LlmError::Parse(format!("openai /v1/responses returned invalid JSON: {e}")))?;
        extract_output_text(&v)
            .ok_or_else(|| LlmError::Parse("openai /v1/responses returned no output_text".to_string()))
    }
}

pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    model_id: String,
    dimension: usize,
    timeout: Option<Duration>,
    client: reqwest::blocking::Client,
}

impl OpenAiEmbedder {
    pub fn new(
        base: Option<&str>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Option<Duration>,
    ) -> Result<Self, LlmError> {
        if dimension == 0 {
            return Err(LlmError::Config("embedding dimension must be positive".to_string()));
        }
        let model = model.into();
        Ok(Self {
            base_url: base_url(base),
            api_key: openai_api_key()?,
            model_id: format!("openai:{model}"),
            model,
            dimension,
            timeout,
            client: http_client(timeout)?,
        })
    }

    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        #[derive(Deserialize)]
        struct EmbeddingsResponse {
            data: Vec<EmbeddingsRow>,
        }
        #[derive(Deserialize)]
        struct EmbeddingsRow {
            embedding: Vec<f32>,
            index: usize,
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float"
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| transport_error(e, &url, self.timeout))?;
        if !resp.status().is_success() {
            return Err(http_error(resp));
        }
        let mut parsed: EmbeddingsResponse = resp
            .json()
            .map_err(|e| LlmError::Parse(format!("openai /v1/embeddings returned invalid JSON: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(LlmError::Parse(format!(
                "openai /v1/embeddings returned {} rows for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        parsed.data.sort_by_key(|r| r.index);
        let mut out = Vec::with_capacity(parsed.data.len());
        for row in parsed.data {
            if row.embedding.len() != self.dimension {
                return Err(LlmError::Parse(format!(
                    "openai model {} returned dimension {}, expected {}",
                    self.model,
                    row.embedding.len(),
                    self.dimension
                )));
            }
            out.push(row.embedding);
        }
        Ok(out)
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop()
            .ok_or_else(|| ProviderError::BadResponse("openai returned no embedding".to_string()))
    }
}
